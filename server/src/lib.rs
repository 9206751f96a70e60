//! Session management, action dispatch and the tick loop for rigsync.
//!
//! Clients connect over WebSocket and send shape-classified frames (see the
//! `frame` crate). The server keeps one [`Session`] per network address,
//! applies pose updates and keystrokes to it, routes action frames through
//! the [`Registry`] to handlers that mutate the scene or the user's views,
//! and streams a JSON snapshot of whatever changed back to each client.
//!
//! # Threads
//!
//! - **Acceptor** - [`Listener`] accepts connections and spawns one thread
//!   per connection.
//! - **Connection** - Decodes frames into [`NetEvent`]s and flushes the
//!   connection's outbound queue between reads.
//! - **Server** - [`Server`] owns all session and scene state and runs the
//!   cycle: drain events, tick, write snapshots, idle.
//!
//! # Fatal conditions
//!
//! A second connection from an address that already has a session, and a
//! connection that resolves to an address with no live session, stop the
//! server with a [`ServerError`]. Everything else is logged and dropped.

mod action;
mod config;
mod error;
mod event;
mod listener;
mod server;
mod session;
mod snapshot;
mod tick;

pub use action::{
    target_of, Action, ActionConfig, ActionHandler, Animate, AnimationScope, Binding,
    BindingSpec, Capability, DispatchOutcome, Dispatcher, HandlerSpec, Input,
    InteractionMachine, InteractionSpec, Paint, Registry, RegistryBuilder, Select, StateSpec,
    DEFAULT_CLICK, DEFAULT_INPUT, TARGET_ID_LEN,
};
pub use config::{
    ServerConfig, SessionConfig, SnapshotConfig, TickConfig, DEFAULT_DT, DEFAULT_HOST,
    DEFAULT_PORT,
};
pub use error::{
    ActionError, ActionResult, RegistryError, RegistryResult, ServerError, ServerResult,
    SessionError, SessionResult, SnapshotError, SnapshotResult,
};
pub use event::{
    decode_message, ClientMessage, ConnectionId, DisconnectReason, NetEvent, SocketHandle,
};
pub use listener::Listener;
pub use server::{CycleReport, Server};
pub use session::{ObjectView, Session, SessionHandle, SessionManager};
pub use snapshot::{SnapshotBuilder, Throughput};
pub use tick::{IdlePoll, SleepPoll, TickLoop, TickReport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        // Verify all expected items are exported
        let _ = ServerConfig::default();
        let _ = ConnectionId::new(0);
        let _ = SessionManager::default();
        let _ = SleepPoll::default();
        let _ = ActionConfig::standard();
        let _ = Capability::Click;

        // Error types
        let _: ServerResult<()> = Ok(());
        let _: RegistryResult<()> = Ok(());
        let _: ActionResult<()> = Ok(());
    }

    #[test]
    fn standard_registry_builds() {
        let registry = Registry::from_config(&ActionConfig::standard()).unwrap();
        assert!(registry.resolve(b'c').is_some());
        assert!(registry.resolve(b'i').is_some());
        assert_eq!(registry.machine_count(), 0);
    }

    #[test]
    fn default_dt_is_nominal() {
        let dt = TickLoop::effective_dt(std::time::Duration::ZERO, DEFAULT_DT);
        assert!((dt - 1.0 / 30.0).abs() < f32::EPSILON);
    }
}
