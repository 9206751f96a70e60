//! The single-owner server loop.
//!
//! Connection threads feed [`NetEvent`]s through a channel. The thread that
//! owns the [`Server`] is the only one that touches sessions and the scene.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError};
use scene::{AnimationEngine, SceneEngine};
use serde_json::{json, Value};
use tracing::{debug, error, info, trace, warn};

use crate::action::{DispatchOutcome, Dispatcher, Registry};
use crate::config::ServerConfig;
use crate::error::{ActionError, ServerError, ServerResult, SessionError};
use crate::event::{ClientMessage, ConnectionId, DisconnectReason, NetEvent, SocketHandle};
use crate::session::{Session, SessionHandle, SessionManager};
use crate::snapshot::SnapshotBuilder;
use crate::tick::{IdlePoll, TickLoop, TickReport};

/// Summary of one server cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub tick: TickReport,
    /// Inbound events handled before the tick.
    pub events: usize,
    /// Snapshot bytes queued to connections after the tick.
    pub bytes_sent: usize,
    pub sessions: usize,
}

/// Owns sessions, the scene and the animation engine.
pub struct Server<S, A> {
    sessions: SessionManager,
    dispatcher: Dispatcher,
    snapshots: SnapshotBuilder,
    ticker: TickLoop,
    scene: S,
    animator: A,
    events: Receiver<NetEvent>,
    started: Instant,
    running: Arc<AtomicBool>,
}

impl<S: SceneEngine, A: AnimationEngine> Server<S, A> {
    pub fn new(
        config: &ServerConfig,
        registry: Arc<Registry>,
        scene: S,
        animator: A,
        events: Receiver<NetEvent>,
    ) -> Self {
        Self {
            sessions: SessionManager::new(config.session),
            dispatcher: Dispatcher::new(registry),
            snapshots: SnapshotBuilder::new(&config.snapshot),
            ticker: TickLoop::new(&config.tick),
            scene,
            animator,
            events,
            started: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Replaces the idle hook run at the end of each cycle.
    #[must_use]
    pub fn with_idle_poll(mut self, idle: Box<dyn IdlePoll>) -> Self {
        self.ticker = self.ticker.with_idle(idle);
        self
    }

    /// Flag that keeps [`Server::run`] going. Store `false` to stop it.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub const fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    #[must_use]
    pub const fn animator(&self) -> &A {
        &self.animator
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticker.tick()
    }

    /// Runs cycles until the shutdown flag is cleared or a fatal error occurs.
    pub fn run(&mut self) -> ServerResult<()> {
        info!("server loop started");
        while self.running.load(Ordering::Acquire) {
            self.run_cycle()?;
        }
        info!(ticks = self.ticker.tick(), "server loop stopped");
        Ok(())
    }

    /// Drains inbound events, ticks the world, pushes snapshots, then idles.
    pub fn run_cycle(&mut self) -> ServerResult<CycleReport> {
        let events = self.drain_events()?;
        let tick = self
            .ticker
            .step(Instant::now(), &mut self.scene, &mut self.animator);
        self.sessions.broadcast_scene_changes(&tick.changed);
        let bytes_sent = self.flush_snapshots()?;
        self.ticker.idle();

        trace!(
            tick = tick.tick,
            dt = tick.dt,
            committed = tick.committed,
            changed_objects = tick.changed.len(),
            converged = tick.converged,
            events,
            bytes_sent,
            "cycle"
        );
        Ok(CycleReport {
            tick,
            events,
            bytes_sent,
            sessions: self.sessions.len(),
        })
    }

    /// Handles every queued event without blocking.
    pub fn drain_events(&mut self) -> ServerResult<usize> {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.handle_event(event)?;
                    handled += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(handled),
            }
        }
    }

    pub fn handle_event(&mut self, event: NetEvent) -> ServerResult<()> {
        match event {
            NetEvent::Connected { address, socket } => self.on_connect(address, socket),
            NetEvent::Message { conn, message } => self.on_message(conn, message),
            NetEvent::Disconnected { conn, reason } => {
                self.on_disconnect(conn, &reason);
                Ok(())
            }
        }
    }

    /// Builds the snapshot for one session and records it for throughput.
    pub fn write_opportunity(&mut self, handle: SessionHandle) -> ServerResult<Vec<u8>> {
        let tick = self.ticker.tick();
        let session = self
            .sessions
            .get_mut(handle)
            .ok_or(ServerError::UnknownAddress {
                address: handle.address(),
            })?;
        let bytes = match self.snapshots.build(session, &self.scene, tick) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(address = %handle.address(), error = %err, "dropping snapshot");
                Vec::new()
            }
        };
        if let Some(rate) = session.throughput_mut().record(bytes.len(), Instant::now()) {
            debug!(address = %handle.address(), bytes_per_sec = rate, "outbound throughput");
        }
        Ok(bytes)
    }

    fn flush_snapshots(&mut self) -> ServerResult<usize> {
        let mut sent = 0;
        for handle in self.sessions.handles() {
            let bytes = self.write_opportunity(handle)?;
            if bytes.is_empty() {
                continue;
            }
            let len = bytes.len();
            let delivered = self
                .sessions
                .get(handle)
                .is_some_and(|session| session.socket().send(bytes));
            if delivered {
                sent += len;
            } else {
                debug!(address = %handle.address(), "connection gone before snapshot");
            }
        }
        Ok(sent)
    }

    fn on_connect(&mut self, address: SocketAddr, socket: SocketHandle) -> ServerResult<()> {
        let incoming = socket.conn();
        match self.sessions.add(address, socket) {
            Ok(handle) => {
                info!(%address, conn = %handle.conn(), "session opened");
                Ok(())
            }
            Err(SessionError::Collision { address, existing }) => {
                error!(%address, %existing, %incoming, "session collision");
                Err(ServerError::SessionCollision {
                    address,
                    existing,
                    incoming,
                })
            }
        }
    }

    fn on_message(&mut self, conn: ConnectionId, message: ClientMessage) -> ServerResult<()> {
        let Some(handle) = self.sessions.get_by_socket(conn) else {
            debug!(%conn, "dropping frame from closed connection");
            return Ok(());
        };
        let now = self.started.elapsed().as_secs_f64();
        let session = self
            .sessions
            .get_mut(handle)
            .ok_or(ServerError::UnknownAddress {
                address: handle.address(),
            })?;

        match message {
            ClientMessage::Pose { location, focal } => session.apply_pose(location, focal),
            ClientMessage::Keystroke(ch) => {
                if let Some(line) = session.push_key(ch) {
                    info!(address = %handle.address(), %line, "input submitted");
                }
            }
            ClientMessage::Json(value) => handle_json(session, &value),
            ClientMessage::Action { code, payload } => {
                let outcome = self.dispatcher.dispatch(
                    session,
                    code,
                    &payload,
                    &mut self.scene,
                    &mut self.animator,
                    now,
                );
                log_outcome(handle, code, &outcome);
            }
        }
        Ok(())
    }

    fn on_disconnect(&mut self, conn: ConnectionId, reason: &DisconnectReason) {
        match self.sessions.get_by_socket(conn) {
            Some(handle) => {
                self.sessions.remove(handle.address());
                info!(address = %handle.address(), %conn, %reason, "session closed");
            }
            None => debug!(%conn, %reason, "connection closed without a session"),
        }
    }
}

fn handle_json(session: &mut Session, value: &Value) {
    if !value.is_object() {
        warn!(address = %session.address(), "dropping non-object JSON message");
        return;
    }
    let cmd = value.get("cmd").and_then(Value::as_str);
    let reply = match cmd {
        Some("ping") => json!({ "cmd": "pong" }),
        _ => {
            info!(address = %session.address(), message = %value, "json message");
            json!({ "ack": cmd })
        }
    };
    if !session.queue_reply(reply) {
        warn!(address = %session.address(), "reply queue full, dropping reply");
    }
}

fn log_outcome(handle: SessionHandle, code: u8, outcome: &DispatchOutcome) {
    let code = char::from(code);
    match outcome {
        DispatchOutcome::Unregistered => {
            trace!(address = %handle.address(), %code, "ignoring unregistered action code");
        }
        DispatchOutcome::Invoked {
            handler,
            target,
            next_state,
        } => debug!(
            address = %handle.address(),
            %code,
            handler = %handler,
            target = target.raw(),
            next_state = ?next_state,
            "action invoked"
        ),
        DispatchOutcome::Rejected(
            err @ (ActionError::MissingTarget { .. } | ActionError::UnknownTarget { .. }),
        ) => debug!(address = %handle.address(), %code, error = %err, "action has no target"),
        DispatchOutcome::Rejected(err) => {
            warn!(address = %handle.address(), %code, error = %err, "action failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionConfig;
    use crate::config::SessionConfig;
    use crossbeam_channel::Sender;
    use scene::{Animator, MemoryScene, ObjectId, SceneObject, Vec3};

    type TestServer = Server<MemoryScene, Animator>;

    fn server() -> (TestServer, Sender<NetEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let scene = MemoryScene::from_objects([
            SceneObject::new(ObjectId::new(1), "lamp").with_property("location", Vec3::ZERO)
        ])
        .unwrap();
        let registry = Registry::from_config(&ActionConfig::standard()).unwrap();
        let server = Server::new(
            &ServerConfig::for_testing(),
            Arc::new(registry),
            scene,
            Animator::new(),
            rx,
        );
        (server, tx)
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn connect(
        server: &mut TestServer,
        port: u16,
        conn: u64,
    ) -> crossbeam_channel::Receiver<Vec<u8>> {
        let (socket, outbox) = SocketHandle::channel(ConnectionId::new(conn));
        server
            .handle_event(NetEvent::Connected {
                address: addr(port),
                socket,
            })
            .unwrap();
        outbox
    }

    fn message(server: &mut TestServer, conn: u64, message: ClientMessage) {
        server
            .handle_event(NetEvent::Message {
                conn: ConnectionId::new(conn),
                message,
            })
            .unwrap();
    }

    fn session(server: &TestServer, port: u16) -> &Session {
        let handle = server
            .sessions()
            .handles()
            .into_iter()
            .find(|handle| handle.address() == addr(port))
            .unwrap();
        server.sessions().get(handle).unwrap()
    }

    #[test]
    fn ping_queues_pong() {
        let (mut server, _tx) = server();
        let _outbox = connect(&mut server, 1, 1);
        message(&mut server, 1, ClientMessage::Json(json!({"cmd": "ping"})));
        assert_eq!(
            session(&server, 1).pending_replies(),
            &[json!({"cmd": "pong"})]
        );
    }

    #[test]
    fn other_json_is_acknowledged() {
        let (mut server, _tx) = server();
        let _outbox = connect(&mut server, 1, 1);
        message(&mut server, 1, ClientMessage::Json(json!({"cmd": "wave"})));
        message(&mut server, 1, ClientMessage::Json(json!({"x": 1})));
        message(&mut server, 1, ClientMessage::Json(json!([1, 2, 3])));
        assert_eq!(
            session(&server, 1).pending_replies(),
            &[json!({"ack": "wave"}), json!({"ack": null})]
        );
    }

    #[test]
    fn collision_is_fatal_and_keeps_first_session() {
        let (mut server, _tx) = server();
        let _outbox = connect(&mut server, 1, 1);
        message(
            &mut server,
            1,
            ClientMessage::Pose {
                location: Vec3::new(1.0, 0.0, 0.0),
                focal: Vec3::ZERO,
            },
        );

        let (socket, _second) = SocketHandle::channel(ConnectionId::new(2));
        let err = server
            .handle_event(NetEvent::Connected {
                address: addr(1),
                socket,
            })
            .unwrap_err();
        assert_eq!(
            err,
            ServerError::SessionCollision {
                address: addr(1),
                existing: ConnectionId::new(1),
                incoming: ConnectionId::new(2),
            }
        );
        assert_eq!(server.sessions().len(), 1);
        assert_eq!(session(&server, 1).location(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn frames_after_disconnect_are_dropped() {
        let (mut server, _tx) = server();
        let _outbox = connect(&mut server, 1, 1);
        server
            .handle_event(NetEvent::Disconnected {
                conn: ConnectionId::new(1),
                reason: DisconnectReason::Closed,
            })
            .unwrap();
        assert!(server.sessions().is_empty());
        message(&mut server, 1, ClientMessage::Keystroke('a'));
        assert!(server.sessions().is_empty());
    }

    #[test]
    fn frame_for_live_connection_without_address_is_fatal() {
        let (mut server, _tx) = server();
        let _outbox = connect(&mut server, 1, 1);
        server.sessions.detach_address(addr(1));

        let err = server
            .handle_event(NetEvent::Message {
                conn: ConnectionId::new(1),
                message: ClientMessage::Pose {
                    location: Vec3::new(1.0, 0.0, 0.0),
                    focal: Vec3::ZERO,
                },
            })
            .unwrap_err();
        assert_eq!(err, ServerError::UnknownAddress { address: addr(1) });

        let err = server
            .handle_event(NetEvent::Message {
                conn: ConnectionId::new(1),
                message: ClientMessage::Action {
                    code: b'c',
                    payload: vec![1, 0, 0, 0],
                },
            })
            .unwrap_err();
        assert_eq!(err, ServerError::UnknownAddress { address: addr(1) });
    }

    #[test]
    fn cycle_drains_events_and_sends_snapshots() {
        let (mut server, tx) = server();
        let (socket, outbox) = SocketHandle::channel(ConnectionId::new(5));
        tx.send(NetEvent::Connected {
            address: addr(9),
            socket,
        })
        .unwrap();
        tx.send(NetEvent::Message {
            conn: ConnectionId::new(5),
            message: ClientMessage::Action {
                code: b'c',
                payload: vec![1, 0, 0, 0],
            },
        })
        .unwrap();

        let report = server.run_cycle().unwrap();
        assert_eq!(report.events, 2);
        assert_eq!(report.sessions, 1);
        assert_eq!(report.tick.tick, 1);
        assert!(report.bytes_sent > 0);

        let bytes = outbox.try_recv().unwrap();
        assert_eq!(bytes.len(), report.bytes_sent);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["objects"]["1"]["selected"].is_number());

        let quiet = server.run_cycle().unwrap();
        assert_eq!(quiet.events, 0);
        assert_eq!(quiet.bytes_sent, 0);
        assert!(outbox.try_recv().is_err());
    }

    #[test]
    fn shutdown_flag_stops_run() {
        let (mut server, _tx) = server();
        server.shutdown_handle().store(false, Ordering::Release);
        server.run().unwrap();
        assert_eq!(server.ticks(), 0);
    }

    #[test]
    fn run_returns_fatal_errors() {
        let (mut server, tx) = server();
        for conn in [1, 2] {
            tx.send(NetEvent::Connected {
                address: addr(3),
                socket: SocketHandle::channel(ConnectionId::new(conn)).0,
            })
            .unwrap();
        }
        let err = server.run().unwrap_err();
        assert!(matches!(err, ServerError::SessionCollision { .. }));
    }

    #[test]
    fn keystrokes_reach_session_buffer() {
        let (mut server, _tx) = server();
        let _outbox = connect(&mut server, 1, 1);
        for ch in "hi".chars() {
            message(&mut server, 1, ClientMessage::Keystroke(ch));
        }
        assert_eq!(session(&server, 1).input(), "hi");
        assert!(SessionConfig::for_testing().max_input_chars >= 2);
    }
}
