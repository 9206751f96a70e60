//! Frame classification and encoding for the rigsync wire protocol.
//!
//! The transport (WebSocket) already delimits messages, so one message is
//! one frame. A frame carries no header: its meaning comes from its shape.
//!
//! | Shape | Meaning |
//! |---|---|
//! | `byte[0] == 0`, 25 bytes | pose update (six little-endian `f32`) |
//! | exactly one byte | keystroke |
//! | more than two bytes, `{` ... `}` | JSON message |
//! | anything else | action invocation (`byte[0]` is the code) |
//!
//! # Design Principles
//!
//! - **Shape first** - Classification never looks past the first and last byte.
//! - **Bounded decoding** - Frame size is validated against limits before parsing.
//! - **No domain knowledge** - This crate decodes frames, not game logic.

mod error;
mod frame;
mod limits;
mod pose;

pub use error::{EncodeError, FrameError, FrameResult};
pub use frame::{
    classify, decode_frame, encode_action, encode_json, encode_keystroke, ActionFrame, Frame,
    FrameKind,
};
pub use limits::Limits;
pub use pose::{decode_pose, encode_pose, Pose, POSE_FRAME_LEN, POSE_PAYLOAD_LEN, POSE_TAG};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        // Verify all expected items are exported
        let _ = POSE_TAG;
        let _ = POSE_FRAME_LEN;
        let _ = Limits::default();
        let _ = FrameKind::Action;
        let _ = Pose::default();

        // Error types
        let _: FrameResult<()> = Ok(());
    }

    #[test]
    fn limits_default_is_reasonable() {
        let limits = Limits::default();
        assert!(
            limits.max_frame_bytes >= POSE_FRAME_LEN,
            "should always admit pose frames"
        );
    }

    #[test]
    fn pose_and_classify_integration() {
        let bytes = encode_pose(&Pose::default());
        assert_eq!(classify(&bytes), Some(FrameKind::Pose));
        assert_eq!(bytes.len(), POSE_FRAME_LEN);
    }
}
