//! Wire protocol for the dictation backend
//!
//! Two message kinds flow over the WebSocket:
//!
//! - Outbound binary: raw little-endian PCM16 frames (see [`crate::audio::Frame`]).
//! - Text, both directions: small JSON objects with a `type` discriminator.
//!
//! Outbound control messages mark recording boundaries. Inbound events carry
//! the remote phase, streamed transcript text, and backend errors. Unknown
//! inbound types deserialize into a catch-all variant so a new server-side
//! message can never break the client.

use serde::{Deserialize, Serialize};

/// Control messages sent to the backend as JSON text.
///
/// Created and sent one-shot by the recording lifecycle, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// The microphone is live; binary frames follow.
    StartRecording,
    /// No more audio for this utterance. Sent after the flush frame and the
    /// grace delay so the backend can finish the tail of speech.
    StopRecording,
}

/// Remote-reported readiness, embedded in `status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    /// Backend is establishing its upstream connection.
    Connecting,
    /// Channel open and backend ready, nothing in flight.
    Idle,
    /// Backend actively processing / streaming a response.
    Connected,
}

/// Events received from the backend as JSON text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Remote processing phase changed.
    Status { status: StatusCode },

    /// Transcript text. `isNewResponse` starts a fresh utterance; otherwise
    /// the content continues the current one.
    Text {
        content: String,
        #[serde(rename = "isNewResponse", default)]
        is_new_response: bool,
    },

    /// Backend gave up on the current utterance. The channel itself is fine.
    Error { content: String },

    /// Catch-all for message types we don't handle, so a single unknown
    /// event cannot cascade into a parse failure.
    #[serde(other)]
    Unknown,
}
