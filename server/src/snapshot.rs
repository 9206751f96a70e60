//! Per-user snapshot serialization and outbound throughput accounting.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use scene::{AnimationSequence, PropertyValue, SceneEngine, Vec3};
use serde::Serialize;
use serde_json::Value;

use crate::config::SnapshotConfig;
use crate::error::SnapshotResult;
use crate::session::{ObjectView, Session};

#[derive(Debug, Serialize)]
struct SnapshotMessage<'a> {
    tick: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    heading: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selected: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<Vec3>,
    #[serde(skip_serializing_if = "is_empty")]
    animations: &'a [AnimationSequence],
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    objects: BTreeMap<u32, ObjectSnapshot<'a>>,
    #[serde(skip_serializing_if = "is_empty")]
    replies: &'a [Value],
}

#[derive(Debug, Default, Serialize)]
struct ObjectSnapshot<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    selected: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty")]
    animations: &'a [AnimationSequence],
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<&'a str, PropertyValue>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

/// Builds the JSON snapshot sent to a session on a write opportunity.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    properties: Vec<String>,
}

impl SnapshotBuilder {
    #[must_use]
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            properties: config.properties.clone(),
        }
    }

    /// Serializes everything pending for `session`.
    ///
    /// Returns an empty buffer when there is nothing to send. A successful
    /// build consumes the session's one-shots and dirty flags.
    pub fn build(
        &self,
        session: &mut Session,
        scene: &dyn SceneEngine,
        tick: u64,
    ) -> SnapshotResult<Vec<u8>> {
        if !session.has_pending() {
            return Ok(Vec::new());
        }
        let bytes = serde_json::to_vec(&self.message(session, scene, tick))?;
        session.consume_pending();
        Ok(bytes)
    }

    fn message<'a>(
        &'a self,
        session: &'a Session,
        scene: &dyn SceneEngine,
        tick: u64,
    ) -> SnapshotMessage<'a> {
        let overlay = session.overlay_dirty();
        let mut objects: BTreeMap<u32, ObjectSnapshot<'a>> = session
            .views()
            .filter(|(_, view)| view.is_dirty())
            .map(|(id, view)| (id.raw(), self.object(id, view, scene)))
            .collect();
        // Shared scene writes go to everyone, whatever their views hold.
        for (id, names) in session.scene_changes() {
            let object = objects.entry(id.raw()).or_default();
            for name in names {
                if let Some(value) = scene.property(*id, name) {
                    object.properties.insert(name.as_str(), value);
                }
            }
        }
        SnapshotMessage {
            tick,
            heading: session.pose_changed().then(|| session.heading()),
            selected: session.selected_at().filter(|_| overlay),
            color: session.color().filter(|_| overlay),
            animations: session.pending_animations(),
            objects,
            replies: session.pending_replies(),
        }
    }

    fn object<'a>(
        &'a self,
        id: scene::ObjectId,
        view: &'a ObjectView,
        scene: &dyn SceneEngine,
    ) -> ObjectSnapshot<'a> {
        let properties = self
            .properties
            .iter()
            .filter_map(|name| Some((name.as_str(), scene.property(id, name)?)))
            .collect();
        ObjectSnapshot {
            selected: view.selected_at(),
            color: view.color(),
            input: view.input(),
            animations: view.pending_animations(),
            properties,
        }
    }
}

/// Rolling count of bytes sent to one session.
///
/// Advisory only; nothing is throttled on it.
#[derive(Debug, Clone)]
pub struct Throughput {
    window: Duration,
    window_start: Option<Instant>,
    window_bytes: u64,
    total_bytes: u64,
    last_rate: Option<f64>,
}

impl Throughput {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            window_bytes: 0,
            total_bytes: 0,
            last_rate: None,
        }
    }

    /// Records `bytes` sent at `now`. Returns the finished window's rate in
    /// bytes per second when this call rolled the window.
    pub fn record(&mut self, bytes: usize, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);
        let mut rolled = None;
        if !elapsed.is_zero() && elapsed >= self.window {
            let rate = self.window_bytes as f64 / elapsed.as_secs_f64();
            self.last_rate = Some(rate);
            rolled = Some(rate);
            self.window_start = Some(now);
            self.window_bytes = 0;
        }
        self.window_bytes += bytes as u64;
        self.total_bytes += bytes as u64;
        rolled
    }

    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Rate of the most recent complete window.
    #[must_use]
    pub const fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }
}
