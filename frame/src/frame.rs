//! Frame classification and decoding.

use std::fmt;

use serde_json::Value;

use crate::error::{EncodeError, FrameError, FrameResult};
use crate::limits::Limits;
use crate::pose::{decode_pose, Pose, POSE_TAG};

/// Structural shape of a frame, determined from its bytes alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Pose,
    Keystroke,
    Json,
    Action,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pose => "pose",
            Self::Keystroke => "keystroke",
            Self::Json => "json",
            Self::Action => "action",
        };
        write!(f, "{name}")
    }
}

/// An action invocation: a one-byte code and an opaque payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionFrame<'a> {
    pub code: u8,
    pub payload: &'a [u8],
}

impl ActionFrame<'_> {
    /// Returns the action code as a character.
    #[must_use]
    pub const fn code_char(&self) -> char {
        self.code as char
    }
}

/// A decoded frame. Borrowed frames never outlive the buffer they came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<'a> {
    Pose(Pose),
    Keystroke(char),
    Json(Value),
    Action(ActionFrame<'a>),
}

impl Frame<'_> {
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::Pose(_) => FrameKind::Pose,
            Self::Keystroke(_) => FrameKind::Keystroke,
            Self::Json(_) => FrameKind::Json,
            Self::Action(_) => FrameKind::Action,
        }
    }
}

/// Classifies a frame by shape. Returns `None` for an empty frame.
///
/// Priority: leading zero byte, then single byte, then brace-delimited
/// text, then everything else as an action.
#[must_use]
pub fn classify(buf: &[u8]) -> Option<FrameKind> {
    let (&first, _) = buf.split_first()?;
    if first == POSE_TAG {
        return Some(FrameKind::Pose);
    }
    if buf.len() == 1 {
        return Some(FrameKind::Keystroke);
    }
    if buf.len() > 2 && first == b'{' && buf[buf.len() - 1] == b'}' {
        return Some(FrameKind::Json);
    }
    Some(FrameKind::Action)
}

/// Decodes a frame. Empty frames decode to `Ok(None)`.
pub fn decode_frame<'a>(buf: &'a [u8], limits: &Limits) -> FrameResult<Option<Frame<'a>>> {
    if buf.len() > limits.max_frame_bytes {
        return Err(FrameError::LimitsExceeded {
            limit: limits.max_frame_bytes,
            actual: buf.len(),
        });
    }
    let Some(kind) = classify(buf) else {
        return Ok(None);
    };
    let frame = match kind {
        FrameKind::Pose => Frame::Pose(decode_pose(&buf[1..])?),
        FrameKind::Keystroke => Frame::Keystroke(decode_keystroke(buf[0])?),
        FrameKind::Json => Frame::Json(serde_json::from_slice(buf)?),
        FrameKind::Action => Frame::Action(ActionFrame {
            code: buf[0],
            payload: &buf[1..],
        }),
    };
    Ok(Some(frame))
}

fn decode_keystroke(byte: u8) -> FrameResult<char> {
    let bytes = [byte];
    let text = std::str::from_utf8(&bytes).map_err(|_| FrameError::Keystroke { byte })?;
    text.chars().next().ok_or(FrameError::Keystroke { byte })
}

/// Encodes a keystroke frame.
pub fn encode_keystroke(ch: char) -> Result<[u8; 1], EncodeError> {
    if !ch.is_ascii() {
        return Err(EncodeError::NonAsciiKeystroke { ch });
    }
    let byte = ch as u8;
    if byte == POSE_TAG {
        return Err(EncodeError::ReservedCode { code: byte });
    }
    Ok([byte])
}

/// Encodes a JSON message frame. The value must be a non-empty object.
pub fn encode_json(value: &Value) -> Result<Vec<u8>, EncodeError> {
    let bytes = value.to_string().into_bytes();
    if classify(&bytes) != Some(FrameKind::Json) {
        return Err(EncodeError::AmbiguousShape {
            intended: FrameKind::Json,
        });
    }
    Ok(bytes)
}

/// Encodes an action frame into `out`, returning the number of bytes written.
pub fn encode_action(code: u8, payload: &[u8], out: &mut [u8]) -> Result<usize, EncodeError> {
    if code == POSE_TAG {
        return Err(EncodeError::ReservedCode { code });
    }
    let needed = 1 + payload.len();
    if out.len() < needed {
        return Err(EncodeError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }
    out[0] = code;
    out[1..needed].copy_from_slice(payload);
    if classify(&out[..needed]) != Some(FrameKind::Action) {
        return Err(EncodeError::AmbiguousShape {
            intended: FrameKind::Action,
        });
    }
    Ok(needed)
}
