pub mod canned;
pub mod types;

pub use canned::*;
pub use types::*;

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("{0}")]
    Failed(String),

    #[error("Extraction timed out after {0:?}")]
    TimedOut(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run `extractor` under a deadline; a hung extraction resolves to `TimedOut`.
pub async fn extract_with_timeout(
    extractor: &dyn Extractor,
    request: ExtractionRequest,
    timeout: Duration,
) -> Result<ExtractionResult, ExtractionError> {
    let started = std::time::Instant::now();
    let outcome = match tokio::time::timeout(timeout, extractor.extract(request)).await {
        Ok(result) => result,
        Err(_) => Err(ExtractionError::TimedOut(timeout)),
    };

    match &outcome {
        Ok(result) => tracing::debug!(
            document_type = %result.document_type,
            confidence = result.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extraction completed"
        ),
        Err(e) => tracing::warn!(error = %e, "Extraction failed"),
    }
    outcome.map(ExtractionResult::normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExtractionRequest {
        ExtractionRequest::bytes(vec![0xFF, 0xD8, 0xFF], "image/jpeg")
    }

    #[tokio::test(start_paused = true)]
    async fn hung_extraction_times_out() {
        let extractor = CannedExtractor::insurance_card().with_delay(Duration::from_secs(3600));
        let err = extract_with_timeout(&extractor, request(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::TimedOut(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_deadline() {
        let extractor = CannedExtractor::insurance_card();
        let result = extract_with_timeout(&extractor, request(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.document_type, "Insurance Card");
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confidence_clamped_on_the_way_out() {
        let extractor = CannedExtractor::new(ExtractionResult {
            document_type: "Passport".into(),
            expiry_date: None,
            key_info: vec![],
            confidence: 1.7,
        });
        let result = extract_with_timeout(&extractor, request(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.confidence, 1.0);
    }
}
