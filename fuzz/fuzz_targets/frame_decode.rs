#![no_main]

use frame::{classify, decode_frame, Frame, FrameKind, Limits};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let limits = Limits::default();
    let kind = classify(data);
    match decode_frame(data, &limits) {
        Ok(None) => assert!(data.is_empty()),
        Ok(Some(frame)) => {
            assert_eq!(Some(frame.kind()), kind);
            if let Frame::Action(action) = frame {
                assert_eq!(action.payload.len() + 1, data.len());
            }
        }
        Err(_) => assert!(matches!(
            kind,
            Some(FrameKind::Pose | FrameKind::Keystroke | FrameKind::Json)
        ) || data.len() > limits.max_frame_bytes),
    }
});
