//! Test-support recognizer implementations.
//!
//! The production engine lives outside this crate; everything here exists
//! so the orchestrator's sequencing, fallback, and timeout behavior can be
//! exercised without it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::types::{RecognizedDocument, TextRecognizer};
use super::ExtractionError;

/// Scripted recognizer: returns a fixed document, optionally failing the
/// first N calls or sleeping before answering.
pub struct MockRecognizer {
    document: RecognizedDocument,
    fail_first: AtomicU32,
    fail_always: bool,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl MockRecognizer {
    pub fn new(document: RecognizedDocument) -> Self {
        Self {
            document,
            fail_first: AtomicU32::new(0),
            fail_always: false,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Recognizer that errors on every call.
    pub fn unavailable() -> Self {
        Self {
            document: RecognizedDocument::from_text("", 0.0),
            fail_first: AtomicU32::new(0),
            fail_always: true,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `n` calls, then succeed. Exercises the
    /// unprocessed-image retry.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = AtomicU32::new(n);
        self
    }

    /// Sleep before answering. Exercises the timeout passthrough.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `recognize` ran.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for MockRecognizer {
    async fn recognize(
        &self,
        _image_bytes: &[u8],
        _lang: &str,
    ) -> Result<RecognizedDocument, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_always {
            return Err(ExtractionError::Recognition("mock engine unavailable".into()));
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExtractionError::Recognition("mock transient failure".into()));
        }

        Ok(self.document.clone())
    }
}
