//! Error types for the server crate.

use std::fmt;
use std::net::SocketAddr;

use scene::{ObjectId, SceneError};

use crate::action::Capability;
use crate::event::ConnectionId;

/// Result type for fatal server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Conditions that stop the server loop.
///
/// Everything else (malformed frames, bad targets, handler failures) is
/// logged and dropped where it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// A second connection arrived from an address that already has a session.
    SessionCollision {
        address: SocketAddr,
        existing: ConnectionId,
        incoming: ConnectionId,
    },

    /// A connection resolved to an address with no live session.
    UnknownAddress { address: SocketAddr },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionCollision {
                address,
                existing,
                incoming,
            } => write!(
                f,
                "session collision on {address}: connection {} already active, {} rejected",
                existing.raw(),
                incoming.raw()
            ),
            Self::UnknownAddress { address } => {
                write!(f, "no live session for address {address}")
            }
        }
    }
}

impl std::error::Error for ServerError {}

/// Result type for session manager operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session manager errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The address already has an active session.
    Collision {
        address: SocketAddr,
        existing: ConnectionId,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collision { address, existing } => write!(
                f,
                "address {address} already has a session on connection {}",
                existing.raw()
            ),
        }
    }
}

impl std::error::Error for SessionError {}

/// Result type for registry construction.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Action configuration that cannot be turned into a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Configuration text is not valid JSON for an action config.
    Parse { message: String },

    /// A binding or machine state names a handler that does not exist.
    UnknownHandler { name: String },

    /// Two handlers share a name.
    DuplicateHandler { name: String },

    /// Two bindings share a code.
    DuplicateCode { code: char },

    /// Code `0` is the pose tag.
    ReservedCode,

    /// Codes are single ASCII characters.
    NonAsciiCode { code: char },

    /// An interaction machine has no states.
    EmptyMachine { object: ObjectId, code: char },

    /// Two machines share an object and trigger code.
    DuplicateMachine { object: ObjectId, code: char },

    /// A machine trigger has no binding, so dispatch would never reach it.
    UnboundTrigger { object: ObjectId, code: char },

    /// A state's `next` points outside the state table.
    NextOutOfRange {
        object: ObjectId,
        code: char,
        next: usize,
        states: usize,
    },

    /// A machine state's handler responds to a different interaction than
    /// the handler bound to the trigger code.
    CapabilityMismatch {
        object: ObjectId,
        code: char,
        handler: String,
        expected: Capability,
        found: Capability,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { message } => write!(f, "invalid action config: {message}"),
            Self::UnknownHandler { name } => write!(f, "unknown handler {name:?}"),
            Self::DuplicateHandler { name } => write!(f, "handler {name:?} defined twice"),
            Self::DuplicateCode { code } => write!(f, "action code {code:?} bound twice"),
            Self::ReservedCode => write!(f, "action code 0 is reserved for pose frames"),
            Self::NonAsciiCode { code } => write!(f, "action code {code:?} is not ASCII"),
            Self::EmptyMachine { object, code } => write!(
                f,
                "interaction on object {} code {code:?} has no states",
                object.raw()
            ),
            Self::DuplicateMachine { object, code } => write!(
                f,
                "interaction on object {} code {code:?} defined twice",
                object.raw()
            ),
            Self::UnboundTrigger { object, code } => write!(
                f,
                "interaction on object {} uses unbound code {code:?}",
                object.raw()
            ),
            Self::NextOutOfRange {
                object,
                code,
                next,
                states,
            } => write!(
                f,
                "interaction on object {} code {code:?}: next state {next} out of range ({states} states)",
                object.raw()
            ),
            Self::CapabilityMismatch {
                object,
                code,
                handler,
                expected,
                found,
            } => write!(
                f,
                "interaction on object {} code {code:?}: handler {handler:?} takes {found}, trigger takes {expected}",
                object.raw()
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Result type for action handlers.
pub type ActionResult<T> = Result<T, ActionError>;

/// Recoverable failures while invoking an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Payload too short to carry a target object ID.
    MissingTarget { len: usize },

    /// The target object does not exist in the scene.
    UnknownTarget { id: ObjectId },

    /// Input text is not valid UTF-8.
    InvalidText,

    /// A scene operation failed.
    Scene(SceneError),
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget { len } => {
                write!(f, "payload of {len} bytes does not name a target object")
            }
            Self::UnknownTarget { id } => write!(f, "unknown target object {}", id.raw()),
            Self::InvalidText => write!(f, "input text is not valid UTF-8"),
            Self::Scene(err) => write!(f, "scene error: {err}"),
        }
    }
}

impl std::error::Error for ActionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Scene(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SceneError> for ActionError {
    fn from(err: SceneError) -> Self {
        Self::Scene(err)
    }
}

/// Result type for snapshot building.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Snapshot serialization failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    Serialize { message: String },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize { message } => write!(f, "snapshot serialization failed: {message}"),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize {
            message: err.to_string(),
        }
    }
}
