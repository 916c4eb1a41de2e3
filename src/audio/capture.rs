//! Microphone capture using CPAL
//!
//! Owns the input device and the live stream. The stream lives on a
//! dedicated thread because cpal's `Stream` is not `Send`; every processing
//! callback converts its chunk to PCM16 and forwards it over a bounded
//! channel with `try_send`, so the audio thread never blocks on a slow
//! consumer.
//!
//! The capture graph is acquired once, on the first recording start, and
//! stays wired for the process lifetime. Gating while idle happens
//! downstream in the session loop, which discards chunks instead of
//! buffering them.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use tokio::sync::{mpsc, oneshot};

use super::convert::convert_chunk;

/// Nominal capture rate the backend expects.
pub const TARGET_SAMPLE_RATE: u32 = 24_000;

/// Errors that can occur while acquiring the microphone.
///
/// All of these are fatal to the start attempt only: the session stays
/// idle, the error is surfaced once, and there is no retry.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
        }
    }
}

impl std::error::Error for AudioError {}

/// Microphone acquisition seam. A trait so the session loop can be
/// exercised in tests without a real input device.
pub trait AudioSource: Send {
    /// Acquire the microphone, or reuse the already granted handle.
    /// May suspend (e.g. waiting on a permission prompt).
    fn acquire(&mut self) -> impl std::future::Future<Output = Result<(), AudioError>> + Send;
}

/// Handle to the capture graph.
///
/// Converted sample chunks arrive on the channel passed to [`CaptureSession::new`].
pub struct CaptureSession {
    chunk_tx: mpsc::Sender<Vec<i16>>,
    started: bool,
}

impl CaptureSession {
    pub fn new(chunk_tx: mpsc::Sender<Vec<i16>>) -> Self {
        Self {
            chunk_tx,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Acquire the microphone and start the stream, or reuse the already
    /// running graph. Suspends until the capture thread reports readiness.
    pub async fn ensure_started(&mut self) -> Result<(), AudioError> {
        if self.started {
            return Ok(());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let chunk_tx = self.chunk_tx.clone();

        std::thread::Builder::new()
            .name("livescribe-capture".to_string())
            .spawn(move || capture_thread(chunk_tx, ready_tx))
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.started = true;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::StreamCreationFailed(
                "Capture thread exited before reporting readiness".to_string(),
            )),
        }
    }
}

impl AudioSource for CaptureSession {
    fn acquire(&mut self) -> impl std::future::Future<Output = Result<(), AudioError>> + Send {
        self.ensure_started()
    }
}

/// Dedicated thread that owns the cpal stream for the process lifetime.
fn capture_thread(chunk_tx: mpsc::Sender<Vec<i16>>, ready_tx: oneshot::Sender<Result<(), AudioError>>) {
    let stream = match build_stream(chunk_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::StreamCreationFailed(format!(
            "Failed to start stream: {}",
            e
        ))));
        return;
    }

    log::info!("Capture: stream running");
    let _ = ready_tx.send(Ok(()));

    // Keep the stream alive; callbacks fire from cpal's own thread.
    loop {
        std::thread::park();
    }
}

fn build_stream(chunk_tx: mpsc::Sender<Vec<i16>>) -> Result<Stream, AudioError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;

    log::info!("Capture: using input device {:?}", device.name());

    let supported = device
        .default_input_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;
    let sample_format = supported.sample_format();
    let native: StreamConfig = supported.into();

    // Ask the device for 24 kHz mono so frames land at the nominal rate.
    let target = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(TARGET_SAMPLE_RATE),
        buffer_size: BufferSize::Default,
    };

    match build_stream_format(&device, &target, sample_format, chunk_tx.clone()) {
        Ok(stream) => {
            log::info!("Capture: {} Hz mono, {:?}", TARGET_SAMPLE_RATE, sample_format);
            Ok(stream)
        }
        Err(e) => {
            // Resampling is the device's job here; frames will carry the
            // native rate if 24 kHz mono is not available.
            log::warn!(
                "Capture: 24 kHz mono unavailable ({}), falling back to {} Hz, {} channel(s)",
                e,
                native.sample_rate.0,
                native.channels
            );
            build_stream_format(&device, &native, sample_format, chunk_tx)
        }
    }
}

fn build_stream_format(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    chunk_tx: mpsc::Sender<Vec<i16>>,
) -> Result<Stream, AudioError> {
    match sample_format {
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, chunk_tx),
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, chunk_tx),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, chunk_tx),
        _ => Err(AudioError::NoSupportedConfig),
    }
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    chunk_tx: mpsc::Sender<Vec<i16>>,
) -> Result<Stream, AudioError>
where
    T: cpal::SizedSample + cpal::Sample<Float = f32> + Send + 'static,
{
    let err_fn = |err| log::error!("Capture: stream error: {}", err);

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk = convert_chunk(data);
                // Never block the audio callback; a full channel means the
                // consumer is behind and this chunk is lost.
                if chunk_tx.try_send(chunk).is_err() {
                    log::debug!("Capture: chunk channel full, dropping {} samples", data.len());
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}
