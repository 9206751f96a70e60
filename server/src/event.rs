//! Events passed from connection threads to the tick-loop thread.

use std::fmt;
use std::net::SocketAddr;

use crossbeam_channel::{Receiver, Sender};
use frame::{decode_frame, Frame, FrameResult, Limits};
use scene::Vec3;
use serde_json::Value;

/// Identifier assigned to each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The server's handle on one connection: its ID and outbound queue.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    conn: ConnectionId,
    outbox: Sender<Vec<u8>>,
}

impl SocketHandle {
    #[must_use]
    pub fn new(conn: ConnectionId, outbox: Sender<Vec<u8>>) -> Self {
        Self { conn, outbox }
    }

    /// Creates a handle plus the receiving end its connection thread drains.
    #[must_use]
    pub fn channel(conn: ConnectionId) -> (Self, Receiver<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(conn, tx), rx)
    }

    #[must_use]
    pub const fn conn(&self) -> ConnectionId {
        self.conn
    }

    /// Queues bytes for the connection. Returns `false` once the
    /// connection thread has gone away.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.outbox.send(bytes).is_ok()
    }
}

/// An inbound frame, decoded and detached from its read buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Pose { location: Vec3, focal: Vec3 },
    Keystroke(char),
    Json(Value),
    Action { code: u8, payload: Vec<u8> },
}

impl From<Frame<'_>> for ClientMessage {
    fn from(frame: Frame<'_>) -> Self {
        match frame {
            Frame::Pose(pose) => Self::Pose {
                location: pose.location.into(),
                focal: pose.focal.into(),
            },
            Frame::Keystroke(ch) => Self::Keystroke(ch),
            Frame::Json(value) => Self::Json(value),
            Frame::Action(action) => Self::Action {
                code: action.code,
                payload: action.payload.to_vec(),
            },
        }
    }
}

/// Decodes a raw frame into an owned message. Empty frames yield `Ok(None)`.
pub fn decode_message(buf: &[u8], limits: &Limits) -> FrameResult<Option<ClientMessage>> {
    Ok(decode_frame(buf, limits)?.map(ClientMessage::from))
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the WebSocket.
    Closed,
    /// The server dropped the connection's outbound queue.
    ServerClosed,
    /// A snapshot write blocked past the write timeout.
    WriteTimeout,
    /// Socket or protocol error.
    Error(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed by peer"),
            Self::ServerClosed => write!(f, "closed by server"),
            Self::WriteTimeout => write!(f, "write timed out"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Events consumed by the tick-loop thread, in per-connection arrival order.
#[derive(Debug)]
pub enum NetEvent {
    Connected {
        address: SocketAddr,
        socket: SocketHandle,
    },
    Message {
        conn: ConnectionId,
        message: ClientMessage,
    },
    Disconnected {
        conn: ConnectionId,
        reason: DisconnectReason,
    },
}
