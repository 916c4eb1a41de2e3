//! The dictation session event loop
//!
//! One cooperative loop couples everything: consumer commands, converted
//! audio chunks from the capture thread, and transport events. Callbacks
//! never interleave mid-execution, so the pending-sample buffer and both
//! state machines are plain single-owner fields with no locking; the whole
//! correctness burden is the ordering of handled events.
//!
//! Ordering guarantees:
//! - frames go out in exact capture order (the accumulator preserves order
//!   and sends happen inline, with no reordering queue);
//! - inbound events are processed one at a time in arrival order;
//! - the stop-grace delay runs inline on the loop and is not interruptible.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::{AudioSource, CaptureSession, FrameAccumulator};
use crate::config::ClientConfig;
use crate::protocol::{ControlMessage, ServerEvent};
use crate::state::{ConnectionPhase, ConnectionStateMachine, RecordingStateMachine};
use crate::transcript::TranscriptBuffer;
use crate::transport::{OutboundSink, TransportChannel, TransportEvent};

/// Capture chunk queue between the audio thread and the loop.
const CHUNK_CAPACITY: usize = 100;

/// Semantic events emitted for the consumer to render. The core owns no
/// presentation.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Channel phase changed (status event or socket close).
    PhaseChanged(ConnectionPhase),
    /// Running transcript after an inbound text event was applied.
    TranscriptUpdated(String),
    /// The remote settled back to idle: the current transcript is final
    /// and offered for auto-copy.
    TranscriptFinal(String),
    RecordingStarted,
    RecordingStopped { elapsed: Duration },
    /// Backend reported an error for the current utterance.
    ServerError(String),
    /// Microphone acquisition failed; the start attempt was aborted.
    CaptureError(String),
}

/// Commands from the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartRecording,
    StopRecording,
    Toggle,
}

/// Handle for dispatching commands into the running session.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub async fn send(&self, command: Command) -> Result<(), mpsc::error::SendError<Command>> {
        self.cmd_tx.send(command).await
    }
}

/// The capture/buffering/streaming core, generic over its two seams so
/// tests can drive it with fakes.
pub struct DictationSession<S: OutboundSink, A: AudioSource> {
    config: ClientConfig,
    sink: S,
    capture: A,
    chunk_rx: mpsc::Receiver<Vec<i16>>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<SessionEvent>,
    recording: RecordingStateMachine,
    connection: ConnectionStateMachine,
    accumulator: FrameAccumulator,
    transcript: TranscriptBuffer,
}

impl DictationSession<TransportChannel, CaptureSession> {
    /// Wire up a session against the real transport and microphone.
    ///
    /// The channel starts connecting immediately; the microphone is only
    /// acquired on the first recording start.
    pub fn connect(
        config: ClientConfig,
    ) -> (Self, SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CAPACITY);
        let (transport, transport_rx) = TransportChannel::open(&config);
        let capture = CaptureSession::new(chunk_tx);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(64);

        let session = Self {
            config,
            sink: transport,
            capture,
            chunk_rx,
            transport_rx,
            cmd_rx,
            event_tx,
            recording: RecordingStateMachine::new(),
            connection: ConnectionStateMachine::new(),
            accumulator: FrameAccumulator::new(),
            transcript: TranscriptBuffer::new(),
        };

        (session, SessionHandle { cmd_tx }, event_rx)
    }
}

impl<S: OutboundSink, A: AudioSource> DictationSession<S, A> {
    /// Run until the consumer or the transport goes away.
    pub async fn run(mut self) {
        log::info!("Session: event loop started");
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(chunk) = self.chunk_rx.recv() => self.handle_chunk(chunk),
                transport = self.transport_rx.recv() => match transport {
                    Some(event) => self.handle_transport(event).await,
                    None => break,
                },
            }
        }
        log::info!("Session: event loop stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartRecording => self.start_recording().await,
            Command::StopRecording => self.stop_recording().await,
            Command::Toggle => {
                if self.recording.is_recording() {
                    self.stop_recording().await
                } else {
                    self.start_recording().await
                }
            }
        }
    }

    async fn start_recording(&mut self) {
        if self.recording.is_recording() {
            log::debug!("Session: start ignored, already recording");
            return;
        }

        // Device errors abort the transition: state stays idle, surfaced
        // once, no retry.
        if let Err(e) = self.capture.acquire().await {
            log::error!("Session: microphone unavailable: {}", e);
            self.emit(SessionEvent::CaptureError(e.to_string())).await;
            return;
        }

        // A new recording never inherits pending audio or stale text.
        self.accumulator.clear();
        self.transcript.reset();

        self.sink.send_control(ControlMessage::StartRecording);
        self.recording.begin();
        log::info!("Session: recording started");
        self.emit(SessionEvent::RecordingStarted).await;
    }

    async fn stop_recording(&mut self) {
        // end() flips the flag first, halting frame forwarding immediately.
        if !self.recording.end() {
            log::debug!("Session: stop ignored, not recording");
            return;
        }

        if let Some(flush) = self.accumulator.drain_remainder() {
            log::debug!("Session: flush frame ({} samples)", flush.len());
            self.sink.send_frame(flush);
        }

        // Grace period between the last audio bytes and the explicit stop
        // signal, so the backend does not truncate the tail of speech.
        tokio::time::sleep(self.config.stop_grace).await;
        self.sink.send_control(ControlMessage::StopRecording);

        let elapsed = self.recording.elapsed().unwrap_or_default();
        log::info!("Session: recording stopped after {:.1}s", elapsed.as_secs_f32());
        self.emit(SessionEvent::RecordingStopped { elapsed }).await;
    }

    fn handle_chunk(&mut self, chunk: Vec<i16>) {
        if !self.recording.is_recording() {
            // The capture graph stays wired while idle; chunks are
            // discarded rather than buffered.
            return;
        }
        self.accumulator.append(&chunk);
        for frame in self.accumulator.drain_ready_frames() {
            self.sink.send_frame(frame);
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                // Phase advances on status events, not on socket open.
                log::info!("Session: channel open, waiting for status");
            }
            TransportEvent::Closed => {
                if self.connection.on_close() {
                    self.emit(SessionEvent::PhaseChanged(ConnectionPhase::Disconnected))
                        .await;
                }
            }
            TransportEvent::Server(ServerEvent::Status { status }) => {
                if self.connection.apply_status(status) {
                    self.emit(SessionEvent::PhaseChanged(self.connection.phase()))
                        .await;
                }
                if self.connection.phase() == ConnectionPhase::Idle {
                    self.emit(SessionEvent::TranscriptFinal(
                        self.transcript.current_text().to_string(),
                    ))
                    .await;
                }
            }
            TransportEvent::Server(ServerEvent::Text {
                content,
                is_new_response,
            }) => {
                let text = self.transcript.apply(&content, is_new_response).to_string();
                self.emit(SessionEvent::TranscriptUpdated(text)).await;
            }
            TransportEvent::Server(ServerEvent::Error { content }) => {
                log::warn!("Session: backend error: {}", content);
                self.emit(SessionEvent::ServerError(content)).await;
                // The server gave up on this utterance but the channel is
                // fine; phase soft-resets to idle.
                if self.connection.force_idle() {
                    self.emit(SessionEvent::PhaseChanged(ConnectionPhase::Idle))
                        .await;
                }
            }
            TransportEvent::Server(ServerEvent::Unknown) => {
                log::debug!("Session: ignoring unknown server event");
            }
        }
    }

    async fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).await.is_err() {
            log::debug!("Session: event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioError, Frame, FRAME_SIZE};
    use crate::protocol::StatusCode;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Frame(usize),
        Control(ControlMessage),
    }

    #[derive(Clone, Default)]
    struct FakeSink {
        sent: Arc<Mutex<Vec<Sent>>>,
    }

    impl OutboundSink for FakeSink {
        fn send_frame(&self, frame: Frame) {
            self.sent.lock().unwrap().push(Sent::Frame(frame.len()));
        }
        fn send_control(&self, message: ControlMessage) {
            self.sent.lock().unwrap().push(Sent::Control(message));
        }
    }

    struct FakeMic {
        fail_with: Option<AudioError>,
    }

    impl AudioSource for FakeMic {
        fn acquire(
            &mut self,
        ) -> impl std::future::Future<Output = Result<(), AudioError>> + Send {
            let result = match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
            async move { result }
        }
    }

    struct Fixture {
        session: DictationSession<FakeSink, FakeMic>,
        sent: Arc<Mutex<Vec<Sent>>>,
        event_rx: mpsc::Receiver<SessionEvent>,
        // Keep the far ends alive for the session's receivers.
        _chunk_tx: mpsc::Sender<Vec<i16>>,
        _transport_tx: mpsc::Sender<TransportEvent>,
        _cmd_tx: mpsc::Sender<Command>,
    }

    fn fixture_with_mic(fail_with: Option<AudioError>) -> Fixture {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let (transport_tx, transport_rx) = mpsc::channel(8);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(64);
        let sink = FakeSink::default();
        let sent = sink.sent.clone();

        let session = DictationSession {
            config: ClientConfig::default(),
            sink,
            capture: FakeMic { fail_with },
            chunk_rx,
            transport_rx,
            cmd_rx,
            event_tx,
            recording: RecordingStateMachine::new(),
            connection: ConnectionStateMachine::new(),
            accumulator: FrameAccumulator::new(),
            transcript: TranscriptBuffer::new(),
        };

        Fixture {
            session,
            sent,
            event_rx,
            _chunk_tx: chunk_tx,
            _transport_tx: transport_tx,
            _cmd_tx: cmd_tx,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_mic(None)
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_recording_sends_no_duplicate_start() {
        let mut fx = fixture();
        fx.session.start_recording().await;
        fx.session.start_recording().await;

        assert!(fx.session.recording.is_recording());
        let sent = fx.sent.lock().unwrap();
        assert_eq!(*sent, vec![Sent::Control(ControlMessage::StartRecording)]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_sends_nothing() {
        let mut fx = fixture();
        fx.session.stop_recording().await;
        assert!(fx.sent.lock().unwrap().is_empty());
        assert!(matches!(fx.event_rx.try_recv(), Err(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_flushes_remainder_then_sends_stop_after_grace() {
        let mut fx = fixture();
        fx.session.start_recording().await;
        fx.session.handle_chunk(vec![0i16; 100]);

        let started = tokio::time::Instant::now();
        fx.session.stop_recording().await;

        // The stop control message went out only after the grace delay.
        assert!(started.elapsed() >= Duration::from_millis(500));

        let sent = fx.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                Sent::Control(ControlMessage::StartRecording),
                Sent::Frame(100),
                Sent::Control(ControlMessage::StopRecording),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_with_empty_buffer_sends_no_flush_frame() {
        let mut fx = fixture();
        fx.session.start_recording().await;
        fx.session.stop_recording().await;

        let sent = fx.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                Sent::Control(ControlMessage::StartRecording),
                Sent::Control(ControlMessage::StopRecording),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_while_idle_are_discarded() {
        let mut fx = fixture();
        fx.session.handle_chunk(vec![0i16; FRAME_SIZE * 2]);
        assert!(fx.sent.lock().unwrap().is_empty());
        assert_eq!(fx.session.accumulator.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_frames_forwarded_in_order_while_recording() {
        let mut fx = fixture();
        fx.session.start_recording().await;
        fx.session.handle_chunk(vec![0i16; FRAME_SIZE + 10]);

        let sent = fx.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                Sent::Control(ControlMessage::StartRecording),
                Sent::Frame(FRAME_SIZE),
            ]
        );
        drop(sent);
        assert_eq!(fx.session.accumulator.pending_len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn mic_failure_aborts_start_and_stays_idle() {
        let mut fx = fixture_with_mic(Some(AudioError::NoInputDevice));
        fx.session.start_recording().await;

        assert!(!fx.session.recording.is_recording());
        assert!(fx.sent.lock().unwrap().is_empty());
        match fx.event_rx.try_recv() {
            Ok(SessionEvent::CaptureError(msg)) => {
                assert!(msg.contains("input device"))
            }
            other => panic!("expected CaptureError, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn streamed_text_events_build_running_transcript() {
        let mut fx = fixture();
        fx.session
            .handle_transport(TransportEvent::Server(ServerEvent::Text {
                content: "Hello".to_string(),
                is_new_response: true,
            }))
            .await;
        fx.session
            .handle_transport(TransportEvent::Server(ServerEvent::Text {
                content: " world".to_string(),
                is_new_response: false,
            }))
            .await;

        assert_eq!(
            fx.event_rx.try_recv().unwrap(),
            SessionEvent::TranscriptUpdated("Hello".to_string())
        );
        assert_eq!(
            fx.event_rx.try_recv().unwrap(),
            SessionEvent::TranscriptUpdated("Hello world".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_status_finalizes_transcript() {
        let mut fx = fixture();
        fx.session
            .handle_transport(TransportEvent::Server(ServerEvent::Text {
                content: "done deal".to_string(),
                is_new_response: true,
            }))
            .await;
        fx.session
            .handle_transport(TransportEvent::Server(ServerEvent::Status {
                status: StatusCode::Idle,
            }))
            .await;

        let mut saw_phase = false;
        let mut saw_final = false;
        while let Ok(event) = fx.event_rx.try_recv() {
            match event {
                SessionEvent::PhaseChanged(ConnectionPhase::Idle) => saw_phase = true,
                SessionEvent::TranscriptFinal(text) => {
                    assert_eq!(text, "done deal");
                    saw_final = true;
                }
                _ => {}
            }
        }
        assert!(saw_phase && saw_final);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_surfaces_and_soft_resets_phase() {
        let mut fx = fixture();
        fx.session
            .handle_transport(TransportEvent::Server(ServerEvent::Status {
                status: StatusCode::Connected,
            }))
            .await;
        fx.session
            .handle_transport(TransportEvent::Server(ServerEvent::Error {
                content: "upstream timeout".to_string(),
            }))
            .await;

        assert_eq!(fx.session.connection.phase(), ConnectionPhase::Idle);
        let events: Vec<SessionEvent> =
            std::iter::from_fn(|| fx.event_rx.try_recv().ok()).collect();
        assert!(events.contains(&SessionEvent::ServerError("upstream timeout".to_string())));
        assert!(events.contains(&SessionEvent::PhaseChanged(ConnectionPhase::Idle)));
    }

    #[tokio::test(start_paused = true)]
    async fn close_reports_disconnected_phase() {
        let mut fx = fixture();
        fx.session
            .handle_transport(TransportEvent::Server(ServerEvent::Status {
                status: StatusCode::Connected,
            }))
            .await;
        fx.session.handle_transport(TransportEvent::Closed).await;

        assert_eq!(fx.session.connection.phase(), ConnectionPhase::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn new_recording_resets_pending_audio_and_transcript() {
        let mut fx = fixture();
        fx.session.start_recording().await;
        fx.session.handle_chunk(vec![0i16; 50]);
        fx.session.stop_recording().await;
        fx.session
            .handle_transport(TransportEvent::Server(ServerEvent::Text {
                content: "stale".to_string(),
                is_new_response: true,
            }))
            .await;

        fx.session.start_recording().await;
        assert_eq!(fx.session.accumulator.pending_len(), 0);
        assert!(fx.session.transcript.is_empty());
    }
}
