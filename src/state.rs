//! Recording and connection state machines
//!
//! Two independent lifecycles govern the client:
//!
//! - [`RecordingStateMachine`]: is the microphone actively feeding frames.
//!   Toggled only by explicit start/stop calls from the consumer.
//! - [`ConnectionStateMachine`]: channel phase as reported by the backend.
//!   A pure projection of transport reports - it never initiates I/O.
//!
//! Both are plain single-owner structs mutated from the session loop only.

use std::time::{Duration, Instant};

use crate::protocol::StatusCode;

/// Whether captured frames are forwarded to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// Gates frame forwarding and owns the elapsed-time display source.
#[derive(Debug)]
pub struct RecordingStateMachine {
    state: RecordingState,
    started_at: Option<Instant>,
}

impl Default for RecordingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStateMachine {
    pub fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            started_at: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// Transition idle -> recording. Returns false (a no-op) when already
    /// recording, so a double start never sends a duplicate control message.
    pub fn begin(&mut self) -> bool {
        if self.is_recording() {
            return false;
        }
        self.state = RecordingState::Recording;
        self.started_at = Some(Instant::now());
        true
    }

    /// Transition recording -> idle. Returns false (a no-op) when idle.
    /// Flipping this flag is the first stop side effect: frame forwarding
    /// halts before the flush frame and stop message go out.
    pub fn end(&mut self) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.state = RecordingState::Idle;
        true
    }

    /// Time since the current (or most recent) recording started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}

/// Channel phase: socket connectivity plus remote-reported readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Socket down; a reconnect is pending.
    Disconnected,
    /// Backend establishing its upstream connection.
    Connecting,
    /// Channel open, backend ready, nothing in flight.
    Idle,
    /// Backend actively processing / streaming a response.
    Connected,
}

impl From<StatusCode> for ConnectionPhase {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::Connecting => ConnectionPhase::Connecting,
            StatusCode::Idle => ConnectionPhase::Idle,
            StatusCode::Connected => ConnectionPhase::Connected,
        }
    }
}

/// Tracks the channel phase, driven exclusively by inbound status events
/// and channel closes.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    phase: ConnectionPhase,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Apply an inbound status event. Valid from any prior phase.
    /// Returns true when the phase actually changed.
    pub fn apply_status(&mut self, status: StatusCode) -> bool {
        self.set(ConnectionPhase::from(status))
    }

    /// The socket closed for any reason.
    pub fn on_close(&mut self) -> bool {
        self.set(ConnectionPhase::Disconnected)
    }

    /// A backend error event: the server gave up on the utterance but the
    /// channel itself is fine, so the phase soft-resets to idle.
    pub fn force_idle(&mut self) -> bool {
        self.set(ConnectionPhase::Idle)
    }

    fn set(&mut self, phase: ConnectionPhase) -> bool {
        if self.phase == phase {
            return false;
        }
        log::debug!("Connection phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_from_idle_starts_recording() {
        let mut rec = RecordingStateMachine::new();
        assert!(!rec.is_recording());
        assert!(rec.begin());
        assert!(rec.is_recording());
        assert!(rec.elapsed().is_some());
    }

    #[test]
    fn begin_while_recording_is_noop() {
        let mut rec = RecordingStateMachine::new();
        assert!(rec.begin());
        assert!(!rec.begin());
        assert!(rec.is_recording());
    }

    #[test]
    fn end_while_idle_is_noop() {
        let mut rec = RecordingStateMachine::new();
        assert!(!rec.end());
        assert!(rec.begin());
        assert!(rec.end());
        assert!(!rec.is_recording());
        assert!(!rec.end());
    }

    #[test]
    fn status_idle_reached_from_any_phase() {
        for start in [
            ConnectionPhase::Disconnected,
            ConnectionPhase::Connecting,
            ConnectionPhase::Idle,
            ConnectionPhase::Connected,
        ] {
            let mut conn = ConnectionStateMachine::new();
            conn.set(start);
            conn.apply_status(StatusCode::Idle);
            assert_eq!(conn.phase(), ConnectionPhase::Idle);
        }
    }

    #[test]
    fn close_forces_disconnected() {
        let mut conn = ConnectionStateMachine::new();
        conn.apply_status(StatusCode::Connected);
        assert!(conn.on_close());
        assert_eq!(conn.phase(), ConnectionPhase::Disconnected);
        // Already disconnected: no change reported
        assert!(!conn.on_close());
    }

    #[test]
    fn error_soft_resets_to_idle() {
        let mut conn = ConnectionStateMachine::new();
        conn.apply_status(StatusCode::Connected);
        assert!(conn.force_idle());
        assert_eq!(conn.phase(), ConnectionPhase::Idle);
    }

    #[test]
    fn apply_status_reports_change() {
        let mut conn = ConnectionStateMachine::new();
        assert!(conn.apply_status(StatusCode::Connecting));
        assert!(!conn.apply_status(StatusCode::Connecting));
        assert!(conn.apply_status(StatusCode::Connected));
    }
}
