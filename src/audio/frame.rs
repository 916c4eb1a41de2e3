//! Frame-aligned buffering of converted PCM samples
//!
//! The backend consumes fixed-size binary frames: 24000 samples of 16-bit
//! mono PCM, one second of audio at 24 kHz. The accumulator collects
//! arbitrarily sized callback chunks and releases full frames as soon as
//! enough data is pending, keeping the remainder for the next cycle.
//!
//! # Accounting invariant
//!
//! `append` followed by `drain_ready_frames` never loses or duplicates a
//! sample: all yielded frames concatenated in order, followed by the final
//! `drain_remainder`, reproduce the exact input sequence regardless of how
//! the input was chunked.

/// Samples per full frame (1 second at 24 kHz mono).
pub const FRAME_SIZE: usize = 24_000;

/// One transmitted unit of audio.
///
/// Always exactly [`FRAME_SIZE`] samples, except the final flush frame sent
/// at stop time, which may be shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether this frame is a full frame (as opposed to a flush frame).
    pub fn is_full(&self) -> bool {
        self.samples.len() == FRAME_SIZE
    }

    /// Encode as the wire payload: little-endian 16-bit signed PCM.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|&s| s.to_le_bytes()).collect()
    }
}

/// Pending-sample buffer between the capture callback and the transport.
///
/// Grows by append, shrinks by slicing off exactly one frame's worth at a
/// time; samples are never reordered. Not internally synchronized - owned
/// and mutated by the session loop only.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    pending: Vec<i16>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(FRAME_SIZE * 2),
        }
    }

    /// Append a chunk of converted samples, preserving order.
    pub fn append(&mut self, samples: &[i16]) {
        self.pending.extend_from_slice(samples);
    }

    /// Remove and yield full frames while enough samples are pending.
    ///
    /// Normally yields zero or one frame per callback, but stays correct
    /// for arbitrarily large appends by yielding several.
    pub fn drain_ready_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while self.pending.len() >= FRAME_SIZE {
            let frame: Vec<i16> = self.pending.drain(..FRAME_SIZE).collect();
            frames.push(Frame::new(frame));
        }
        frames
    }

    /// Remove and return whatever is left as a final flush frame.
    ///
    /// Returns `None` when no samples are pending. The buffer is empty
    /// after this call.
    pub fn drain_remainder(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            return None;
        }
        Some(Frame::new(std::mem::take(&mut self.pending)))
    }

    /// Number of samples waiting for the next frame boundary.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard pending samples. Called at recording start so a new session
    /// never inherits audio from the previous one.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
