//! Intake review: the user names and files a draft before it is committed.
//!
//! A draft carries whatever extraction produced. The review adds the two
//! required fields (name, category), optionally a description and an expiry
//! override, and commits everything to the store in one step. Nothing reaches
//! the store until both required fields are present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{parse_expiry_date, Category, Document, DocumentSource, ProcessingState};
use crate::pipeline::extraction::ExtractionRequest;
use crate::pipeline::{DraftDocument, ExtractionOutcome, IntakeError};
use crate::store::DocumentStore;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Extraction output shown beside the review form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSummary {
    pub document_type: Option<String>,
    pub key_info: Vec<String>,
    pub suggested_expiry: Option<DateTime<Utc>>,
    pub confidence: Option<f32>,
    /// Set when extraction ran and failed.
    pub failure: Option<String>,
    /// Set when extraction is deferred until after commit.
    pub deferred: bool,
}

/// Content kept after commit for a document whose extraction is deferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExtraction {
    pub document_id: Uuid,
    pub content: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl PendingExtraction {
    pub fn request(&self) -> ExtractionRequest {
        let request = ExtractionRequest::bytes(self.content.clone(), self.mime_type.clone());
        match &self.file_name {
            Some(name) => request.with_file_name(name.clone()),
            None => request,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewCommit {
    pub document: Document,
    pub pending: Option<PendingExtraction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpiryChoice {
    /// Use whatever extraction suggested.
    Suggested,
    Override(Option<DateTime<Utc>>),
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct IntakeReview {
    draft: DraftDocument,
    name: String,
    category: Option<Category>,
    description: Option<String>,
    expiry: ExpiryChoice,
    committed: bool,
}

impl IntakeReview {
    /// Start a review; the name is prefilled from the draft's suggestion.
    pub fn new(draft: DraftDocument) -> Self {
        Self {
            name: draft.suggested_name.clone(),
            draft,
            category: None,
            description: None,
            expiry: ExpiryChoice::Suggested,
            committed: false,
        }
    }

    pub fn draft(&self) -> &DraftDocument {
        &self.draft
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// Other staged files the batch did not turn into documents.
    pub fn ignored_files(&self) -> &[String] {
        &self.draft.ignored_files
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_category(&mut self, category: Category) {
        self.category = Some(category);
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        let description = description.into();
        self.description = (!description.trim().is_empty()).then_some(description);
    }

    /// Override the suggested expiry. `None` records "does not expire".
    pub fn set_expiry_date(&mut self, expiry: Option<DateTime<Utc>>) {
        self.expiry = ExpiryChoice::Override(expiry);
    }

    /// Parse user-typed expiry text. Blank text clears the expiry.
    pub fn set_expiry_text(&mut self, raw: &str) -> Result<(), IntakeError> {
        if raw.trim().is_empty() {
            self.set_expiry_date(None);
            return Ok(());
        }
        let parsed = parse_expiry_date(raw)?;
        self.set_expiry_date(Some(parsed));
        Ok(())
    }

    /// Go back to the extracted expiry suggestion.
    pub fn use_suggested_expiry(&mut self) {
        self.expiry = ExpiryChoice::Suggested;
    }

    pub fn expiry_date(&self) -> Option<DateTime<Utc>> {
        match self.expiry {
            ExpiryChoice::Override(expiry) => expiry,
            ExpiryChoice::Suggested => self.draft.extraction.result().and_then(|r| r.parsed_expiry()),
        }
    }

    pub fn extracted(&self) -> ExtractedSummary {
        let result = self.draft.extraction.result();
        ExtractedSummary {
            document_type: result.map(|r| r.document_type.clone()),
            key_info: result.map(|r| r.key_info.clone()).unwrap_or_default(),
            suggested_expiry: result.and_then(|r| r.parsed_expiry()),
            confidence: result.map(|r| r.confidence),
            failure: match &self.draft.extraction {
                ExtractionOutcome::Failed { reason } => Some(reason.clone()),
                _ => None,
            },
            deferred: matches!(self.draft.extraction, ExtractionOutcome::Pending),
        }
    }

    /// First missing required field, if any.
    pub fn validate(&self) -> Result<Category, IntakeError> {
        if self.name.trim().is_empty() {
            return Err(IntakeError::ValidationError("name"));
        }
        self.category.ok_or(IntakeError::ValidationError("category"))
    }

    pub fn can_commit(&self) -> bool {
        !self.committed && self.validate().is_ok()
    }

    /// Validate, assign identity, and append to `store`.
    ///
    /// All-or-nothing: on any error the store is untouched and the review
    /// can be corrected and committed again.
    pub fn commit(
        &mut self,
        store: &mut DocumentStore,
        now: DateTime<Utc>,
    ) -> Result<ReviewCommit, IntakeError> {
        if self.committed {
            return Err(IntakeError::InvalidTransition {
                action: "commit",
                state: "committed".into(),
            });
        }
        let category = self.validate()?;

        let processing_state = self.draft.extraction.initial_processing_state();
        let confidence = match (self.draft.source, &self.draft.extraction) {
            (DocumentSource::Camera, ExtractionOutcome::Completed(result)) => {
                Some(result.confidence)
            }
            _ => None,
        };

        let document = Document {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            category,
            upload_date: now,
            expiry_date: self.expiry_date(),
            processing_state,
            source: self.draft.source,
            size_bytes: self.draft.size_bytes,
            source_file_name: self.draft.source_file_name.clone(),
            description: self.description.clone(),
            confidence,
        };

        store.append(document.clone())?;
        self.committed = true;

        tracing::info!(
            document_id = %document.id,
            category = %category,
            source = %document.source,
            processing = %processing_state,
            "Document committed"
        );

        let pending = match processing_state {
            ProcessingState::Pending => {
                self.draft
                    .content
                    .take()
                    .map(|content| PendingExtraction {
                        document_id: document.id,
                        content,
                        mime_type: self.draft.mime_type.clone(),
                        file_name: self.draft.source_file_name.clone(),
                    })
            }
            _ => {
                self.draft.release_content();
                None
            }
        };

        Ok(ReviewCommit { document, pending })
    }

    /// Discard the draft without touching the store.
    pub fn cancel(mut self) {
        self.draft.release_content();
        tracing::debug!(source = %self.draft.source, "Intake review cancelled");
    }
}
