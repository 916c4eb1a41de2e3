//! Audio capture and frame-aligned buffering.

pub mod capture;
pub mod convert;
pub mod frame;

pub use capture::{AudioError, AudioSource, CaptureSession, TARGET_SAMPLE_RATE};
pub use convert::sample_to_i16;
pub use frame::{Frame, FrameAccumulator, FRAME_SIZE};
