//! Scene errors.

use std::fmt;

use crate::ObjectId;

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Errors that can occur when querying or mutating a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// No object with this ID exists.
    UnknownObject { id: ObjectId },

    /// An object with this ID already exists.
    DuplicateObject { id: ObjectId },

    /// Property holds a value of a different type.
    TypeMismatch {
        id: ObjectId,
        property: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownObject { id } => write!(f, "unknown object {}", id.raw()),
            Self::DuplicateObject { id } => write!(f, "duplicate object {}", id.raw()),
            Self::TypeMismatch {
                id,
                property,
                expected,
                found,
            } => write!(
                f,
                "object {} property {property:?}: expected {expected}, found {found}",
                id.raw()
            ),
        }
    }
}

impl std::error::Error for SceneError {}
