//! Client configuration
//!
//! Everything the session needs to reach the backend. No persistence: the
//! client keeps no state on disk, so this is a plain value filled in by the
//! consumer (the console binary takes the host from its first argument).

use std::time::Duration;

/// WebSocket path exposed by the dictation backend.
const WS_PATH: &str = "/api/v1/ws";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend host, including port when non-default (e.g. "localhost:8000").
    pub host: String,

    /// Use the secure channel scheme (wss). Matches how the page-based
    /// client upgrades when served over https.
    pub secure: bool,

    /// Fixed delay between a channel close and the single scheduled
    /// reconnection attempt. No backoff, no cap.
    pub reconnect_delay: Duration,

    /// Pause between the last audio bytes and the stop control message,
    /// giving the backend time to process trailing speech.
    pub stop_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost:8000".to_string(),
            secure: false,
            reconnect_delay: Duration::from_secs(1),
            stop_grace: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
            ..Self::default()
        }
    }

    /// Full WebSocket endpoint URL.
    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host, WS_PATH)
    }
}
