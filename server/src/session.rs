//! Per-user session state and the manager that owns it.
//!
//! Sessions are keyed by network address. The manager is owned by the
//! tick-loop thread and is the only place sessions are created or destroyed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;

use scene::{AnimationSequence, ObjectId, Vec3};
use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::event::{ConnectionId, SocketHandle};
use crate::snapshot::Throughput;

const BACKSPACE: char = '\u{8}';

/// A session's private overlay on one scene object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectView {
    selected_at: Option<f64>,
    color: Option<Vec3>,
    input: Option<String>,
    animations: Vec<AnimationSequence>,
    // Cursor into the object's interaction machine, if it has one.
    state: usize,
    dirty: bool,
}

impl ObjectView {
    #[must_use]
    pub const fn selected_at(&self) -> Option<f64> {
        self.selected_at
    }

    #[must_use]
    pub const fn color(&self) -> Option<Vec3> {
        self.color
    }

    #[must_use]
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    /// One-shot animations not yet sent to the client.
    #[must_use]
    pub fn pending_animations(&self) -> &[AnimationSequence] {
        &self.animations
    }

    /// Current state index of the object's interaction machine.
    #[must_use]
    pub const fn interaction_state(&self) -> usize {
        self.state
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn select(&mut self, now: f64) {
        self.selected_at = Some(now);
        self.dirty = true;
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = Some(color);
        self.dirty = true;
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = Some(text.into());
        self.dirty = true;
    }

    pub fn queue_animation(&mut self, sequence: AnimationSequence) {
        self.animations.push(sequence);
        self.dirty = true;
    }

    pub(crate) fn set_interaction_state(&mut self, state: usize) {
        self.state = state;
    }

    fn consume(&mut self) {
        self.animations.clear();
        self.dirty = false;
    }
}

/// Live state for one connected user.
#[derive(Debug)]
pub struct Session {
    address: SocketAddr,
    socket: SocketHandle,
    location: Vec3,
    focal_point: Vec3,
    heading: Vec3,
    pose_changed: bool,
    selected_at: Option<f64>,
    color: Option<Vec3>,
    animations: Vec<AnimationSequence>,
    overlay_dirty: bool,
    views: BTreeMap<ObjectId, ObjectView>,
    scene_changes: BTreeMap<ObjectId, BTreeSet<String>>,
    input: String,
    replies: Vec<Value>,
    throughput: Throughput,
    config: SessionConfig,
}

impl Session {
    #[must_use]
    pub fn new(address: SocketAddr, socket: SocketHandle, config: SessionConfig) -> Self {
        Self {
            address,
            socket,
            location: Vec3::ZERO,
            focal_point: Vec3::ZERO,
            heading: Vec3::ZERO,
            pose_changed: false,
            selected_at: None,
            color: None,
            animations: Vec::new(),
            overlay_dirty: false,
            views: BTreeMap::new(),
            scene_changes: BTreeMap::new(),
            input: String::new(),
            replies: Vec::new(),
            throughput: Throughput::new(config.throughput_window),
            config,
        }
    }

    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    #[must_use]
    pub const fn socket(&self) -> &SocketHandle {
        &self.socket
    }

    #[must_use]
    pub const fn location(&self) -> Vec3 {
        self.location
    }

    #[must_use]
    pub const fn focal_point(&self) -> Vec3 {
        self.focal_point
    }

    /// Unit vector from location toward the focal point.
    #[must_use]
    pub const fn heading(&self) -> Vec3 {
        self.heading
    }

    pub fn set_focal_point(&mut self, focal: Vec3) {
        self.focal_point = focal;
    }

    /// Moves the user and recomputes the heading from the current focal point.
    pub fn set_location(&mut self, location: Vec3) {
        self.location = location;
        self.heading = (self.focal_point - self.location).normalize_or_zero();
        self.pose_changed = true;
    }

    /// Applies a pose update. The focal point goes first so the heading
    /// trigger on location sees the new focal point.
    pub fn apply_pose(&mut self, location: Vec3, focal: Vec3) {
        self.set_focal_point(focal);
        self.set_location(location);
    }

    #[must_use]
    pub const fn selected_at(&self) -> Option<f64> {
        self.selected_at
    }

    pub fn select(&mut self, now: f64) {
        self.selected_at = Some(now);
        self.overlay_dirty = true;
    }

    #[must_use]
    pub const fn color(&self) -> Option<Vec3> {
        self.color
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = Some(color);
        self.overlay_dirty = true;
    }

    /// Queues a one-shot animation for the user's own client.
    pub fn queue_animation(&mut self, sequence: AnimationSequence) {
        self.animations.push(sequence);
        self.overlay_dirty = true;
    }

    #[must_use]
    pub fn pending_animations(&self) -> &[AnimationSequence] {
        &self.animations
    }

    #[must_use]
    pub fn view(&self, id: ObjectId) -> Option<&ObjectView> {
        self.views.get(&id)
    }

    /// Returns the view for `id`, creating an empty one on first use.
    pub fn view_mut(&mut self, id: ObjectId) -> &mut ObjectView {
        self.views.entry(id).or_default()
    }

    pub fn views(&self) -> impl Iterator<Item = (ObjectId, &ObjectView)> + '_ {
        self.views.iter().map(|(id, view)| (*id, view))
    }

    /// Shared scene properties written since the last snapshot.
    #[must_use]
    pub const fn scene_changes(&self) -> &BTreeMap<ObjectId, BTreeSet<String>> {
        &self.scene_changes
    }

    /// Merges properties committed to the shared scene into the next snapshot.
    pub fn note_scene_changes(&mut self, changed: &BTreeMap<ObjectId, BTreeSet<String>>) {
        for (id, names) in changed {
            self.scene_changes
                .entry(*id)
                .or_default()
                .extend(names.iter().cloned());
        }
    }

    /// Current contents of the keystroke buffer.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Applies one keystroke. Returns the submitted line on newline.
    ///
    /// Other control characters are ignored, and printable characters past
    /// the configured bound are dropped.
    pub fn push_key(&mut self, ch: char) -> Option<String> {
        match ch {
            BACKSPACE => {
                self.input.pop();
                None
            }
            '\n' | '\r' => Some(std::mem::take(&mut self.input)),
            ch if ch.is_control() => None,
            ch => {
                if self.input.chars().count() < self.config.max_input_chars {
                    self.input.push(ch);
                }
                None
            }
        }
    }

    /// Queues a JSON reply for the next snapshot. Returns `false` when the
    /// reply queue is full and the reply was dropped.
    pub fn queue_reply(&mut self, reply: Value) -> bool {
        if self.replies.len() >= self.config.max_pending_replies {
            return false;
        }
        self.replies.push(reply);
        true
    }

    #[must_use]
    pub fn pending_replies(&self) -> &[Value] {
        &self.replies
    }

    /// `true` when the pose changed since the last snapshot.
    #[must_use]
    pub const fn pose_changed(&self) -> bool {
        self.pose_changed
    }

    /// `true` when the session-wide overlay changed since the last snapshot.
    #[must_use]
    pub const fn overlay_dirty(&self) -> bool {
        self.overlay_dirty
    }

    /// `true` when a snapshot would carry anything.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pose_changed
            || self.overlay_dirty
            || !self.replies.is_empty()
            || !self.scene_changes.is_empty()
            || self.views.values().any(ObjectView::is_dirty)
    }

    #[must_use]
    pub const fn throughput(&self) -> &Throughput {
        &self.throughput
    }

    pub(crate) fn throughput_mut(&mut self) -> &mut Throughput {
        &mut self.throughput
    }

    /// Clears one-shots and dirty flags after a snapshot was built.
    pub(crate) fn consume_pending(&mut self) {
        self.pose_changed = false;
        self.overlay_dirty = false;
        self.animations.clear();
        self.replies.clear();
        self.scene_changes.clear();
        self.views.values_mut().for_each(ObjectView::consume);
    }
}

/// Lookup key for a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    address: SocketAddr,
    conn: ConnectionId,
}

impl SessionHandle {
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    #[must_use]
    pub const fn conn(&self) -> ConnectionId {
        self.conn
    }
}

/// Owns every live session. One session per address.
#[derive(Debug, Default)]
pub struct SessionManager {
    config: SessionConfig,
    sessions: HashMap<SocketAddr, Session>,
    by_conn: HashMap<ConnectionId, SocketAddr>,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Creates a session for an unseen address.
    ///
    /// An address that already has a session is a collision; the existing
    /// session is left as it was.
    pub fn add(&mut self, address: SocketAddr, socket: SocketHandle) -> SessionResult<SessionHandle> {
        if let Some(existing) = self.sessions.get(&address) {
            return Err(SessionError::Collision {
                address,
                existing: existing.socket.conn(),
            });
        }
        let conn = socket.conn();
        self.by_conn.insert(conn, address);
        self.sessions
            .insert(address, Session::new(address, socket, self.config));
        Ok(SessionHandle { address, conn })
    }

    /// Resolves a connection to its session handle.
    #[must_use]
    pub fn get_by_socket(&self, conn: ConnectionId) -> Option<SessionHandle> {
        self.by_conn
            .get(&conn)
            .map(|&address| SessionHandle { address, conn })
    }

    /// Destroys the session for `address`.
    pub fn remove(&mut self, address: SocketAddr) -> Option<Session> {
        let session = self.sessions.remove(&address)?;
        self.by_conn.remove(&session.socket.conn());
        Some(session)
    }

    /// Drops the session for `address` but keeps its connection mapping.
    #[cfg(test)]
    pub(crate) fn detach_address(&mut self, address: SocketAddr) {
        self.sessions.remove(&address);
    }

    #[must_use]
    pub fn get(&self, handle: SessionHandle) -> Option<&Session> {
        self.sessions
            .get(&handle.address)
            .filter(|session| session.socket.conn() == handle.conn)
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut Session> {
        self.sessions
            .get_mut(&handle.address)
            .filter(|session| session.socket.conn() == handle.conn)
    }

    #[must_use]
    pub fn contains(&self, address: SocketAddr) -> bool {
        self.sessions.contains_key(&address)
    }

    /// Queues committed scene changes for every live session.
    pub fn broadcast_scene_changes(&mut self, changed: &BTreeMap<ObjectId, BTreeSet<String>>) {
        if changed.is_empty() {
            return;
        }
        for session in self.sessions.values_mut() {
            session.note_scene_changes(changed);
        }
    }

    /// Handles for every live session, ordered by address.
    #[must_use]
    pub fn handles(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<_> = self
            .sessions
            .values()
            .map(|session| SessionHandle {
                address: session.address,
                conn: session.socket.conn(),
            })
            .collect();
        handles.sort_by_key(|handle| handle.address);
        handles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn socket(id: u64) -> SocketHandle {
        SocketHandle::channel(ConnectionId::new(id)).0
    }

    fn session() -> Session {
        Session::new(addr(1), socket(1), SessionConfig::for_testing())
    }

    #[test]
    fn distinct_addresses_get_independent_sessions() {
        let mut manager = SessionManager::new(SessionConfig::for_testing());
        let a = manager.add(addr(1), socket(1)).unwrap();
        let b = manager.add(addr(2), socket(2)).unwrap();
        manager
            .get_mut(a)
            .unwrap()
            .set_location(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.get(b).unwrap().location(), Vec3::ZERO);
        assert_eq!(manager.get_by_socket(ConnectionId::new(2)), Some(b));
    }

    #[test]
    fn duplicate_address_collides_without_merging() {
        let mut manager = SessionManager::new(SessionConfig::for_testing());
        let first = manager.add(addr(1), socket(1)).unwrap();
        manager.get_mut(first).unwrap().select(2.5);

        let err = manager.add(addr(1), socket(7)).unwrap_err();
        assert_eq!(
            err,
            SessionError::Collision {
                address: addr(1),
                existing: ConnectionId::new(1),
            }
        );
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get_by_socket(ConnectionId::new(7)), None);
        assert_eq!(manager.get(first).unwrap().selected_at(), Some(2.5));
    }

    #[test]
    fn remove_forgets_connection() {
        let mut manager = SessionManager::new(SessionConfig::for_testing());
        let handle = manager.add(addr(1), socket(1)).unwrap();
        assert!(manager.remove(addr(1)).is_some());
        assert!(manager.is_empty());
        assert_eq!(manager.get_by_socket(handle.conn()), None);
        assert!(manager.get(handle).is_none());
        assert!(manager.remove(addr(1)).is_none());
    }

    #[test]
    fn stale_handle_does_not_reach_new_session() {
        let mut manager = SessionManager::new(SessionConfig::for_testing());
        let old = manager.add(addr(1), socket(1)).unwrap();
        manager.remove(addr(1));
        let new = manager.add(addr(1), socket(2)).unwrap();
        assert!(manager.get(old).is_none());
        assert!(manager.get(new).is_some());
    }

    #[test]
    fn handles_are_sorted_by_address() {
        let mut manager = SessionManager::new(SessionConfig::for_testing());
        manager.add(addr(3), socket(1)).unwrap();
        manager.add(addr(1), socket(2)).unwrap();
        let ports: Vec<_> = manager
            .handles()
            .iter()
            .map(|handle| handle.address().port())
            .collect();
        assert_eq!(ports, vec![1, 3]);
    }

    #[test]
    fn heading_uses_focal_point_set_first() {
        let mut session = session();
        session.apply_pose(Vec3::new(1.0, 2.0, 3.0), Vec3::new(11.0, 2.0, 3.0));
        assert_eq!(session.heading(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(session.location(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(session.focal_point(), Vec3::new(11.0, 2.0, 3.0));
        assert!(session.pose_changed());
    }

    #[test]
    fn coincident_focal_point_gives_zero_heading() {
        let mut session = session();
        session.apply_pose(Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(session.heading(), Vec3::ZERO);
    }

    #[test]
    fn keystrokes_edit_and_submit() {
        let mut session = session();
        for ch in "helo".chars() {
            assert_eq!(session.push_key(ch), None);
        }
        session.push_key(BACKSPACE);
        session.push_key('p');
        session.push_key('\u{1b}');
        assert_eq!(session.input(), "help");
        assert_eq!(session.push_key('\n'), Some("help".to_string()));
        assert_eq!(session.input(), "");
        session.push_key(BACKSPACE);
        assert_eq!(session.input(), "");
    }

    #[test]
    fn keystroke_buffer_is_bounded() {
        let mut session = session();
        for _ in 0..100 {
            session.push_key('x');
        }
        assert_eq!(
            session.input().len(),
            SessionConfig::for_testing().max_input_chars
        );
    }

    #[test]
    fn reply_queue_is_bounded() {
        let mut session = session();
        let max = SessionConfig::for_testing().max_pending_replies;
        for _ in 0..max {
            assert!(session.queue_reply(Value::Null));
        }
        assert!(!session.queue_reply(Value::Null));
        assert_eq!(session.pending_replies().len(), max);
    }

    #[test]
    fn scene_changes_reach_every_session_until_consumed() {
        let mut manager = SessionManager::new(SessionConfig::for_testing());
        let a = manager.add(addr(1), socket(1)).unwrap();
        let b = manager.add(addr(2), socket(2)).unwrap();
        let mut changed = BTreeMap::new();
        changed.insert(ObjectId::new(3), BTreeSet::from(["angle".to_string()]));
        manager.broadcast_scene_changes(&changed);
        changed.insert(ObjectId::new(3), BTreeSet::from(["label".to_string()]));
        manager.broadcast_scene_changes(&changed);

        for handle in [a, b] {
            let session = manager.get(handle).unwrap();
            assert!(session.has_pending());
            assert_eq!(session.scene_changes()[&ObjectId::new(3)].len(), 2);
        }
        let session = manager.get_mut(a).unwrap();
        session.consume_pending();
        assert!(session.scene_changes().is_empty());
        assert!(manager.get(b).unwrap().has_pending());

        manager.broadcast_scene_changes(&BTreeMap::new());
        assert!(!manager.get(a).unwrap().has_pending());
    }

    #[test]
    fn consume_clears_pending_state_but_keeps_overlay() {
        let mut session = session();
        let id = ObjectId::new(4);
        session.set_color(Vec3::new(1.0, 0.0, 0.0));
        session.view_mut(id).queue_animation(AnimationSequence::default());
        session.view_mut(id).set_interaction_state(2);
        session.queue_reply(Value::Bool(true));
        assert!(session.has_pending());

        session.consume_pending();
        assert!(!session.has_pending());
        assert_eq!(session.color(), Some(Vec3::new(1.0, 0.0, 0.0)));
        let view = session.view(id).unwrap();
        assert!(view.pending_animations().is_empty());
        assert_eq!(view.interaction_state(), 2);
    }
}
