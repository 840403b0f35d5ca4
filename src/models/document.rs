use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Category, DocumentSource, ProcessingState};
use super::ModelError;

/// A committed document. Only intake review creates these; the store owns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub category: Category,
    pub upload_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub processing_state: ProcessingState,
    pub source: DocumentSource,
    pub size_bytes: Option<u64>,
    pub source_file_name: Option<String>,
    pub description: Option<String>,
    /// Extraction certainty in [0, 1]; camera-sourced documents only.
    pub confidence: Option<f32>,
}

/// Parse an expiry date as produced by extraction or typed by a user.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 and `MM/DD/YYYY`. Calendar dates are
/// pinned to midnight UTC so comparisons never depend on the local zone.
pub fn parse_expiry_date(raw: &str) -> Result<DateTime<Utc>, ModelError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .map_err(|_| ModelError::InvalidDate(raw.to_string()))?;

    Ok(midnight_utc(date))
}

pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
