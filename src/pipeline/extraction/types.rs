use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::models::parse_expiry_date;

/// Structured result of extraction. Field names match the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub document_type: String,
    /// ISO date as reported by the extractor; parsed lazily.
    pub expiry_date: Option<String>,
    pub key_info: Vec<String>,
    pub confidence: f32,
}

impl ExtractionResult {
    /// Clamp confidence into [0, 1]; NaN counts as no confidence.
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// The expiry date as a UTC instant. Unparseable dates are dropped.
    pub fn parsed_expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry_date.as_deref()?;
        match parse_expiry_date(raw) {
            Ok(dt) => Some(dt),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparseable extracted expiry date");
                None
            }
        }
    }
}

/// Fields the extractor is asked to fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub fields: Vec<String>,
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self {
            fields: vec![
                "documentType".into(),
                "expiryDate".into(),
                "keyInfo".into(),
                "confidence".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionInput {
    /// Raw bytes, e.g. a captured camera frame or a transferred file.
    Bytes { data: Vec<u8>, mime_type: String },
    /// A file on disk the extractor reads itself.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub input: ExtractionInput,
    /// Original file name, when there is one; lets a weak extractor fall
    /// back to filename-derived metadata.
    pub file_name: Option<String>,
    pub schema: ExtractionSchema,
}

impl ExtractionRequest {
    pub fn bytes(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            input: ExtractionInput::Bytes {
                data,
                mime_type: mime_type.into(),
            },
            file_name: None,
            schema: ExtractionSchema::default(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            input: ExtractionInput::File(path.into()),
            file_name: None,
            schema: ExtractionSchema::default(),
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Extraction boundary. Implementations may be a local model, a remote
/// service, or the canned stand-in; the intake state machines do not care.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, request: ExtractionRequest)
        -> Result<ExtractionResult, ExtractionError>;
}
