//! Canned extractor: fixed delay, fixed payload.
//!
//! Stands in for a recognition model until one is wired up. Also the
//! extractor every pipeline test runs against.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{ExtractionError, ExtractionRequest, ExtractionResult, Extractor};

const DEFAULT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct CannedExtractor {
    outcome: Result<ExtractionResult, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl CannedExtractor {
    pub fn new(result: ExtractionResult) -> Self {
        Self {
            outcome: Ok(result),
            delay: DEFAULT_DELAY,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with `reason` after the delay.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
            delay: DEFAULT_DELAY,
            calls: AtomicUsize::new(0),
        }
    }

    /// Payload for a camera-captured card.
    pub fn insurance_card() -> Self {
        Self::new(ExtractionResult {
            document_type: "Insurance Card".into(),
            expiry_date: Some("12/25/2025".into()),
            key_info: vec![
                "Policy Number: INS-123456".into(),
                "Member ID: MEM-789012".into(),
            ],
            confidence: 0.95,
        })
    }

    /// Payload for an uploaded file with nothing recognizable in it.
    pub fn uploaded_document() -> Self {
        Self::new(ExtractionResult {
            document_type: "Uploaded Document".into(),
            expiry_date: None,
            key_info: vec![
                "File processed successfully".into(),
                "Ready for organization".into(),
            ],
            confidence: 0.88,
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of extraction calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for CannedExtractor {
    async fn extract(
        &self,
        request: ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            file_name = ?request.file_name,
            delay_ms = self.delay.as_millis() as u64,
            "Canned extraction started"
        );

        tokio::time::sleep(self.delay).await;

        match &self.outcome {
            Ok(result) => Ok(result.clone()),
            Err(reason) => Err(ExtractionError::Failed(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn failing_extractor_reports_reason() {
        let extractor = CannedExtractor::failing("unreadable");
        let err = extractor
            .extract(ExtractionRequest::file("/tmp/none.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unreadable");
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_honored() {
        let extractor = CannedExtractor::uploaded_document().with_delay(Duration::from_millis(200));
        let started = tokio::time::Instant::now();
        extractor
            .extract(ExtractionRequest::bytes(vec![1, 2, 3], "application/pdf"))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
