//! Application state shared by every caller of the crate.
//!
//! `CoreState` owns the single canonical `DocumentStore`. Views read it only
//! through projections; it is mutated only by review commits, the edit
//! surface, deletes, and deferred processing. Each mutation bumps a revision
//! published on a `watch` channel so views can re-project without polling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::collection::{self, CollectionSummary, Projection};
use crate::config::{ConfigError, IntakeConfig};
use crate::models::{Category, Document, DocumentQuery, ProcessingState};
use crate::pipeline::capture::MediaSource;
use crate::pipeline::extraction::{extract_with_timeout, ExtractionError, Extractor};
use crate::pipeline::{IntakeError, IntakeFlow};
use crate::review::{IntakeReview, PendingExtraction};
use crate::store::{DocumentStore, StoreError};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Document {id} is not awaiting processing ({state})")]
    NotPending { id: Uuid, state: ProcessingState },
}

pub struct CoreState {
    store: RwLock<DocumentStore>,
    config: IntakeConfig,
    extractor: Arc<dyn Extractor>,
    /// Content of committed documents whose extraction is deferred.
    pending: Mutex<HashMap<Uuid, PendingExtraction>>,
    revision: watch::Sender<u64>,
}

impl CoreState {
    pub fn new(config: IntakeConfig, extractor: Arc<dyn Extractor>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store: RwLock::new(DocumentStore::new()),
            config,
            extractor,
            pending: Mutex::new(HashMap::new()),
            revision,
        }
    }

    /// Build from the on-disk config, or defaults when there is none.
    pub fn load(extractor: Arc<dyn Extractor>) -> Result<Self, CoreError> {
        let config = IntakeConfig::load_or_default()?;
        Ok(Self::new(config, extractor))
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// A fresh intake flow sharing this state's extractor and config.
    pub fn intake_flow(&self, media: Arc<dyn MediaSource>) -> IntakeFlow {
        IntakeFlow::new(media, Arc::clone(&self.extractor), self.config.clone())
    }

    // ── Store access ────────────────────────────────────────

    pub fn read_store(&self) -> Result<RwLockReadGuard<'_, DocumentStore>, CoreError> {
        self.store.read().map_err(|_| CoreError::LockPoisoned)
    }

    fn write_store(&self) -> Result<RwLockWriteGuard<'_, DocumentStore>, CoreError> {
        self.store.write().map_err(|_| CoreError::LockPoisoned)
    }

    /// Snapshot of every document, newest first.
    pub fn documents(&self) -> Result<Vec<Document>, CoreError> {
        Ok(self.read_store()?.all().to_vec())
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Document>, CoreError> {
        Ok(self.read_store()?.get(id).cloned())
    }

    // ── Change notification ─────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    // ── Mutations ───────────────────────────────────────────

    pub fn commit(&self, review: &mut IntakeReview) -> Result<Document, CoreError> {
        self.commit_at(review, Utc::now())
    }

    /// Commit a reviewed draft. The store lock is held for the whole commit,
    /// so two commits never interleave.
    pub fn commit_at(
        &self,
        review: &mut IntakeReview,
        now: DateTime<Utc>,
    ) -> Result<Document, CoreError> {
        let committed = {
            let mut store = self.write_store()?;
            review.commit(&mut store, now)?
        };

        if let Some(pending) = committed.pending {
            self.pending
                .lock()
                .map_err(|_| CoreError::LockPoisoned)?
                .insert(pending.document_id, pending);
        }
        self.bump();
        Ok(committed.document)
    }

    /// Delete a document. Deleting an absent id is not an error.
    pub fn delete(&self, id: &Uuid) -> Result<Option<Document>, CoreError> {
        let removed = self.write_store()?.remove(id);
        match &removed {
            Some(doc) => {
                self.pending
                    .lock()
                    .map_err(|_| CoreError::LockPoisoned)?
                    .remove(id);
                tracing::info!(document_id = %doc.id, "Document deleted");
                self.bump();
            }
            None => tracing::debug!(document_id = %id, "Delete of absent document ignored"),
        }
        Ok(removed)
    }

    pub fn rename(&self, id: &Uuid, name: &str) -> Result<(), CoreError> {
        self.write_store()?.rename(id, name)?;
        tracing::info!(document_id = %id, "Document renamed");
        self.bump();
        Ok(())
    }

    pub fn recategorize(&self, id: &Uuid, category: Category) -> Result<(), CoreError> {
        self.write_store()?.recategorize(id, category)?;
        tracing::info!(document_id = %id, category = %category, "Document recategorized");
        self.bump();
        Ok(())
    }

    pub fn set_expiry(
        &self,
        id: &Uuid,
        expiry_date: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        self.write_store()?.set_expiry(id, expiry_date)?;
        tracing::info!(document_id = %id, has_expiry = expiry_date.is_some(), "Expiry updated");
        self.bump();
        Ok(())
    }

    /// Run deferred extraction for a `pending` document.
    ///
    /// Moves it `pending → processing → {completed, failed}` exactly once; a
    /// second call, or one racing the first, gets `NotPending`. A completed
    /// extraction fills in the expiry date when the user left it blank.
    pub async fn process_pending(&self, id: &Uuid) -> Result<ProcessingState, CoreError> {
        let pending = {
            let mut store = self.write_store()?;
            let state = store
                .get(id)
                .map(|d| d.processing_state)
                .ok_or(StoreError::NotFound(*id))?;
            if state != ProcessingState::Pending {
                return Err(CoreError::NotPending { id: *id, state });
            }
            store.advance_processing(id, ProcessingState::Processing)?;
            self.pending
                .lock()
                .map_err(|_| CoreError::LockPoisoned)?
                .remove(id)
        };
        self.bump();
        tracing::info!(document_id = %id, "Deferred extraction started");

        let outcome = match &pending {
            Some(pending) => {
                extract_with_timeout(
                    self.extractor.as_ref(),
                    pending.request(),
                    self.config.extraction_timeout(),
                )
                .await
            }
            None => Err(ExtractionError::Failed("content no longer available".into())),
        };

        let settled = {
            let mut store = self.write_store()?;
            match &outcome {
                Ok(result) => {
                    store.advance_processing(id, ProcessingState::Completed)?;
                    let missing_expiry = store.get(id).is_some_and(|d| d.expiry_date.is_none());
                    if let (true, Some(expiry)) = (missing_expiry, result.parsed_expiry()) {
                        store.set_expiry(id, Some(expiry))?;
                    }
                    ProcessingState::Completed
                }
                Err(_) => {
                    store.advance_processing(id, ProcessingState::Failed)?;
                    ProcessingState::Failed
                }
            }
        };
        self.bump();

        match &outcome {
            Ok(_) => tracing::info!(document_id = %id, "Deferred extraction completed"),
            Err(e) => tracing::warn!(document_id = %id, error = %e, "Deferred extraction failed"),
        }
        Ok(settled)
    }

    // ── Projections ─────────────────────────────────────────

    pub fn project(&self, query: &DocumentQuery) -> Result<Projection, CoreError> {
        self.project_at(query, Utc::now())
    }

    pub fn project_at(
        &self,
        query: &DocumentQuery,
        now: DateTime<Utc>,
    ) -> Result<Projection, CoreError> {
        let store = self.read_store()?;
        Ok(collection::project_view(store.all(), query, now, &self.config))
    }

    pub fn summary(&self) -> Result<CollectionSummary, CoreError> {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> Result<CollectionSummary, CoreError> {
        let store = self.read_store()?;
        Ok(collection::summarize(store.all(), now, &self.config))
    }
}
