//! Real-time microphone streaming client for a dictation backend.
//!
//! Captures microphone audio, converts it to 16-bit PCM, reshapes it into
//! fixed one-second frames and streams them over a persistent WebSocket,
//! while projecting the channel's health and the backend's processing phase
//! into semantic events for a consumer to render.

pub mod audio;
pub mod config;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transcript;
pub mod transport;

pub use audio::{Frame, FrameAccumulator, FRAME_SIZE};
pub use config::ClientConfig;
pub use session::{Command, DictationSession, SessionEvent, SessionHandle};
pub use state::ConnectionPhase;
