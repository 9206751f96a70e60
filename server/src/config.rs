//! Server configuration.

use std::time::Duration;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Nominal tick length used when no wall-clock delta is available.
pub const DEFAULT_DT: f32 = 1.0 / 30.0;

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Frame size limits applied by connection threads.
    pub frame_limits: frame::Limits,
    /// How long a connection thread blocks on a read before flushing its outbox.
    pub read_timeout: Duration,
    /// How long a snapshot write may block before the connection is dropped.
    pub write_timeout: Duration,
    pub tick: TickConfig,
    pub snapshot: SnapshotConfig,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            frame_limits: frame::Limits::default(),
            read_timeout: Duration::from_millis(10),
            write_timeout: Duration::from_secs(1),
            tick: TickConfig::default(),
            snapshot: SnapshotConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loopback on an ephemeral port with no idle sleep.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            frame_limits: frame::Limits::for_testing(),
            read_timeout: Duration::from_millis(5),
            write_timeout: Duration::from_millis(200),
            tick: TickConfig {
                idle_delay: Duration::ZERO,
                default_dt: DEFAULT_DT,
            },
            snapshot: SnapshotConfig::default(),
            session: SessionConfig::for_testing(),
        }
    }

    /// `host:port` string for binding.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Tick loop timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickConfig {
    /// Sleep performed by the default idle hook at the end of each cycle.
    pub idle_delay: Duration,
    /// `dt` used for the first cycle and whenever the measured delta is zero.
    pub default_dt: f32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(10),
            default_dt: DEFAULT_DT,
        }
    }
}

/// Snapshot contents.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotConfig {
    /// Scene properties included for each dirty object view.
    pub properties: Vec<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            properties: vec!["location".to_string()],
        }
    }
}

/// Per-session bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum characters held in the keystroke buffer.
    pub max_input_chars: usize,
    /// Maximum JSON replies queued between snapshots.
    pub max_pending_replies: usize,
    /// Length of the rolling outbound throughput window.
    pub throughput_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 1024,
            max_pending_replies: 64,
            throughput_window: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_input_chars: 16,
            max_pending_replies: 4,
            throughput_window: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listens_on_all_interfaces() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
        assert_eq!(config.tick.idle_delay, Duration::from_millis(10));
        assert!(config.write_timeout > config.read_timeout);
        assert!((config.tick.default_dt - 1.0 / 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn testing_config_is_ephemeral() {
        let config = ServerConfig::for_testing();
        assert_eq!(config.port, 0);
        assert_eq!(config.tick.idle_delay, Duration::ZERO);
        assert!(config.session.max_input_chars < SessionConfig::default().max_input_chars);
    }

    #[test]
    fn snapshot_defaults_include_location() {
        let config = SnapshotConfig::default();
        assert_eq!(config.properties, vec!["location".to_string()]);
        assert_eq!(
            SessionConfig::default().throughput_window,
            Duration::from_secs(1)
        );
    }
}
