//! Intake pipeline: camera capture and file upload, both ending in a draft
//! document that intake review commits to the store.

pub mod capture;
pub mod draft;
pub mod extraction;
pub mod flow;
pub mod upload;

pub use draft::*;
pub use flow::*;

use thiserror::Error;
use uuid::Uuid;

use crate::models::ModelError;
use crate::store::StoreError;
use capture::MediaError;
use extraction::ExtractionError;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Camera access was denied")]
    PermissionDenied,

    #[error("No camera device available")]
    NoDevice,

    #[error("Unsupported file {file_name} ({mime_type})")]
    UnsupportedFile { file_name: String, mime_type: String },

    #[error("File too large: {file_name} is {size_bytes} bytes, limit {max_bytes}")]
    FileTooLarge {
        file_name: String,
        size_bytes: u64,
        max_bytes: u64,
    },

    #[error("Missing required field: {0}")]
    ValidationError(&'static str),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    #[error("Document id already present: {0}")]
    DuplicateId(Uuid),

    #[error("No files staged")]
    EmptyBatch,

    #[error("Intake cancelled")]
    Cancelled,

    #[error("Frame capture failed: {0}")]
    CaptureFailed(String),

    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },

    #[error("Invalid value: {0}")]
    Model(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntakeError {
    /// Everything but a duplicate id is something the user can retry or correct.
    /// A duplicate id means the id-assignment bookkeeping is broken.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::DuplicateId(_))
    }
}

impl From<StoreError> for IntakeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateId(id) => Self::DuplicateId(id),
            other => Self::Store(other),
        }
    }
}

impl From<MediaError> for IntakeError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::PermissionDenied => Self::PermissionDenied,
            MediaError::NoDevice => Self::NoDevice,
            other => Self::CaptureFailed(other.to_string()),
        }
    }
}
