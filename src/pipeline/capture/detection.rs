use std::time::Duration;

use super::media::Frame;

/// Decides whether a frame contains a document-shaped boundary.
pub trait DocumentDetector: Send + Sync {
    /// `watching_for` is how long detection has been running this attempt.
    fn detect(&self, frame: &Frame, watching_for: Duration) -> bool;
}

/// Reports a document once the feed has been watched for `settle`.
/// Used until an edge-detection model is available.
#[derive(Debug, Clone, Copy)]
pub struct SettleDelayDetector {
    pub settle: Duration,
}

impl SettleDelayDetector {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }
}

impl DocumentDetector for SettleDelayDetector {
    fn detect(&self, frame: &Frame, watching_for: Duration) -> bool {
        !frame.data.is_empty() && watching_for >= self.settle
    }
}
