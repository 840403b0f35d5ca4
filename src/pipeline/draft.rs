use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DocumentSource, ProcessingState};
use super::extraction::ExtractionResult;

/// What the extraction step produced for a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Completed(ExtractionResult),
    Failed { reason: String },
    /// Extraction was not attempted yet; it runs after commit.
    Pending,
}

impl ExtractionOutcome {
    /// Processing state a committed document starts in.
    pub fn initial_processing_state(&self) -> ProcessingState {
        match self {
            Self::Completed(_) => ProcessingState::Completed,
            Self::Failed { .. } => ProcessingState::Failed,
            Self::Pending => ProcessingState::Pending,
        }
    }

    pub fn result(&self) -> Option<&ExtractionResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// An intake candidate. Has no permanent id until committed.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftDocument {
    pub suggested_name: String,
    pub source: DocumentSource,
    pub mime_type: String,
    pub size_bytes: Option<u64>,
    pub source_file_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub extraction: ExtractionOutcome,
    /// Staged files beyond the primary one; not part of this document.
    pub ignored_files: Vec<String>,
    /// Captured or transferred content, held until commit or cancel.
    pub content: Option<Vec<u8>>,
}

impl DraftDocument {
    /// Drop the in-memory blob.
    pub fn release_content(&mut self) {
        if let Some(content) = self.content.take() {
            tracing::debug!(bytes = content.len(), "Released draft content");
        }
    }
}

/// "Scanned Document 14:03:22"
pub fn scanned_document_name(at: DateTime<Utc>) -> String {
    format!("Scanned Document {}", at.format("%H:%M:%S"))
}

/// File name with its last extension stripped; falls back to the full name.
pub fn name_from_file(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}
