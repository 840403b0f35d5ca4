//! In-memory document store, the session's single source of truth.
//!
//! Documents are kept most-recent-first. Head insertion order is also the
//! tie-break order every projection falls back to.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Category, Document, ProcessingState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document id already present: {0}")]
    DuplicateId(Uuid),

    #[error("Document not found: {0}")]
    NotFound(Uuid),

    #[error("Document name cannot be empty")]
    EmptyName,

    #[error("Processing already settled for {id} ({state})")]
    ProcessingAlreadySettled { id: Uuid, state: ProcessingState },
}

#[derive(Debug, Default, Clone)]
pub struct DocumentStore {
    documents: Vec<Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head. Fails if the id is already present.
    pub fn append(&mut self, document: Document) -> Result<(), StoreError> {
        if self.contains(&document.id) {
            return Err(StoreError::DuplicateId(document.id));
        }
        self.documents.insert(0, document);
        Ok(())
    }

    /// Remove by id. Removing an absent id is a no-op; returns what was removed.
    pub fn remove(&mut self, id: &Uuid) -> Option<Document> {
        let pos = self.documents.iter().position(|d| d.id == *id)?;
        Some(self.documents.remove(pos))
    }

    /// All documents, newest first.
    pub fn all(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, id: &Uuid) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == *id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn rename(&mut self, id: &Uuid, name: &str) -> Result<(), StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        self.get_mut(id)?.name = name.to_string();
        Ok(())
    }

    pub fn recategorize(&mut self, id: &Uuid, category: Category) -> Result<(), StoreError> {
        self.get_mut(id)?.category = category;
        Ok(())
    }

    pub fn set_expiry(
        &mut self,
        id: &Uuid,
        expiry_date: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.get_mut(id)?.expiry_date = expiry_date;
        Ok(())
    }

    /// Move a document's processing state forward. Settled states are final.
    pub fn advance_processing(
        &mut self,
        id: &Uuid,
        next: ProcessingState,
    ) -> Result<(), StoreError> {
        let doc = self.get_mut(id)?;
        if doc.processing_state.is_settled() {
            return Err(StoreError::ProcessingAlreadySettled {
                id: *id,
                state: doc.processing_state,
            });
        }
        doc.processing_state = next;
        Ok(())
    }

    fn get_mut(&mut self, id: &Uuid) -> Result<&mut Document, StoreError> {
        self.documents
            .iter_mut()
            .find(|d| d.id == *id)
            .ok_or(StoreError::NotFound(*id))
    }
}
