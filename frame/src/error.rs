//! Error types for frame operations.

use std::fmt;

/// Result type for frame decoding.
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors raised while classifying or decoding an inbound frame.
///
/// Every variant is recoverable: the caller drops the frame and keeps the
/// connection open.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    /// Frame is larger than the configured limit.
    LimitsExceeded { limit: usize, actual: usize },

    /// Pose frame payload is not exactly six floats.
    PoseLength { expected: usize, actual: usize },

    /// Single-byte frame is not a complete UTF-8 character.
    Keystroke { byte: u8 },

    /// JSON-shaped frame failed to parse.
    InvalidJson {
        line: usize,
        column: usize,
        message: String,
    },
}

/// Errors that can occur while encoding a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Output buffer is too small.
    BufferTooSmall { needed: usize, available: usize },

    /// Byte 0 is reserved for pose frames.
    ReservedCode { code: u8 },

    /// Keystrokes must fit in one byte.
    NonAsciiKeystroke { ch: char },

    /// The encoded bytes would be classified as a different frame shape.
    AmbiguousShape { intended: crate::FrameKind },
}

impl From<serde_json::Error> for FrameError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LimitsExceeded { limit, actual } => {
                write!(f, "frame too large: {actual} > {limit} bytes")
            }
            Self::PoseLength { expected, actual } => {
                write!(
                    f,
                    "pose payload length mismatch: expected {expected} bytes, got {actual}"
                )
            }
            Self::Keystroke { byte } => {
                write!(f, "keystroke byte 0x{byte:02X} is not a complete utf-8 character")
            }
            Self::InvalidJson {
                line,
                column,
                message,
            } => {
                write!(f, "invalid json at {line}:{column}: {message}")
            }
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small: need {needed}, have {available}")
            }
            Self::ReservedCode { code } => write!(f, "action code {code} is reserved"),
            Self::NonAsciiKeystroke { ch } => {
                write!(f, "keystroke {ch:?} does not fit in a single byte")
            }
            Self::AmbiguousShape { intended } => {
                write!(f, "encoded {intended} frame would not decode as {intended}")
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl std::error::Error for EncodeError {}
