//! Running transcript assembled from streamed text events
//!
//! The backend streams an utterance as a sequence of `text` events. The
//! first event of a new utterance carries `isNewResponse: true` and replaces
//! whatever is displayed; continuations append. The buffer holds the running
//! text between events so the consumer always sees a coherent transcript.

/// Accumulates streamed transcript text for display.
#[derive(Debug, Clone, Default)]
pub struct TranscriptBuffer {
    text: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound text event and return the running text.
    ///
    /// `is_new_response` resets the transcript to `content`; otherwise
    /// `content` extends the current utterance.
    pub fn apply(&mut self, content: &str, is_new_response: bool) -> &str {
        if is_new_response {
            self.text.clear();
        }
        self.text.push_str(content);
        &self.text
    }

    pub fn current_text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Clear for a new recording session.
    pub fn reset(&mut self) {
        self.text.clear();
    }
}
