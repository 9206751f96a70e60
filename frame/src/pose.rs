//! Fixed-layout pose frames.
//!
//! Layout (25 bytes):
//!
//! ```text
//! [0x00][x1 y1 z1: location][x2 y2 z2: focal point]
//!        six little-endian f32 values
//! ```

use crate::error::{FrameError, FrameResult};

/// Leading byte that marks a pose frame.
pub const POSE_TAG: u8 = 0;

/// Size of the pose payload (after the tag byte).
pub const POSE_PAYLOAD_LEN: usize = 6 * 4;

/// Total size of an encoded pose frame.
pub const POSE_FRAME_LEN: usize = 1 + POSE_PAYLOAD_LEN;

/// Location and focal point reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub location: [f32; 3],
    pub focal: [f32; 3],
}

impl Pose {
    #[must_use]
    pub const fn new(location: [f32; 3], focal: [f32; 3]) -> Self {
        Self { location, focal }
    }
}

/// Decodes the 24-byte pose payload (tag byte already stripped).
pub fn decode_pose(payload: &[u8]) -> FrameResult<Pose> {
    if payload.len() != POSE_PAYLOAD_LEN {
        return Err(FrameError::PoseLength {
            expected: POSE_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    let mut values = [0f32; 6];
    for (value, chunk) in values.iter_mut().zip(payload.chunks_exact(4)) {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(chunk);
        *value = f32::from_le_bytes(raw);
    }
    Ok(Pose {
        location: [values[0], values[1], values[2]],
        focal: [values[3], values[4], values[5]],
    })
}

/// Encodes a complete pose frame, tag byte included.
#[must_use]
pub fn encode_pose(pose: &Pose) -> [u8; POSE_FRAME_LEN] {
    let mut out = [0u8; POSE_FRAME_LEN];
    out[0] = POSE_TAG;
    let values = pose.location.iter().chain(pose.focal.iter());
    for (idx, value) in values.enumerate() {
        let start = 1 + idx * 4;
        out[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }
    out
}
