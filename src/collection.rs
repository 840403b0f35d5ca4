//! Collection engine: filtered, sorted projections over the document store.
//!
//! Projections never mutate the store. Every sort is stable, so documents
//! that tie on the sort key keep store order (newest first).

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::IntakeConfig;
use crate::expiry;
use crate::models::{
    Category, Document, DocumentQuery, DocumentSource, ExpiryStatus, SortKey, ViewMode,
};
use crate::pipeline::upload::format_file_size;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A document plus everything derived from it for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCard {
    pub document: Document,
    pub status: ExpiryStatus,
    pub days_until_expiry: Option<i64>,
    pub is_new: bool,
    pub size_label: Option<String>,
}

/// Per-category document counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub all: usize,
    pub insurance: usize,
    pub identity: usize,
    pub vehicle: usize,
    pub medical: usize,
    pub financial: usize,
    pub legal: usize,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::Insurance => self.insurance,
            Category::Identity => self.identity,
            Category::Vehicle => self.vehicle,
            Category::Medical => self.medical,
            Category::Financial => self.financial,
            Category::Legal => self.legal,
        }
    }

    fn bump(&mut self, category: Category) {
        self.all += 1;
        let slot = match category {
            Category::Insurance => &mut self.insurance,
            Category::Identity => &mut self.identity,
            Category::Vehicle => &mut self.vehicle,
            Category::Medical => &mut self.medical,
            Category::Financial => &mut self.financial,
            Category::Legal => &mut self.legal,
        };
        *slot += 1;
    }
}

/// Everything a grid or list view needs, in one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub view_mode: ViewMode,
    pub items: Vec<DocumentCard>,
    pub total_documents: usize,
    pub category_counts: CategoryCounts,
}

/// Dashboard aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub total_documents: usize,
    pub expiring_soon: usize,
    pub expired: usize,
    pub added_this_month: usize,
    pub scanned_this_month: usize,
    pub recent: Vec<DocumentCard>,
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Filter and sort `documents` (store order) for display.
pub fn project(
    documents: &[Document],
    query: &DocumentQuery,
    now: DateTime<Utc>,
    config: &IntakeConfig,
) -> Vec<DocumentCard> {
    let needle = query.search.to_lowercase();

    let mut cards: Vec<DocumentCard> = documents
        .iter()
        .filter(|doc| doc.name.to_lowercase().contains(&needle))
        .filter(|doc| query.category.matches(doc.category))
        .map(|doc| card_for(doc, now, config))
        .filter(|card| query.status.map_or(true, |s| card.status == s))
        .collect();

    // Vec::sort_by is stable: equal keys keep store order.
    cards.sort_by(|a, b| compare(&a.document, &b.document, query.sort_key));
    cards
}

/// `project` plus the counts and view mode the presentation layer renders.
pub fn project_view(
    documents: &[Document],
    query: &DocumentQuery,
    now: DateTime<Utc>,
    config: &IntakeConfig,
) -> Projection {
    Projection {
        view_mode: query.view_mode,
        items: project(documents, query, now, config),
        total_documents: documents.len(),
        category_counts: count_categories(documents),
    }
}

pub fn card_for(doc: &Document, now: DateTime<Utc>, config: &IntakeConfig) -> DocumentCard {
    DocumentCard {
        document: doc.clone(),
        status: expiry::evaluate_with_window(doc.expiry_date, now, config.expiry_window_days),
        days_until_expiry: expiry::days_until(doc.expiry_date, now),
        is_new: uploaded_recently(doc.upload_date, now, config.new_badge_hours),
        size_label: doc.size_bytes.map(format_file_size),
    }
}

/// Uploaded within the last `badge_hours`. Out-of-range hours saturate.
fn uploaded_recently(uploaded: DateTime<Utc>, now: DateTime<Utc>, badge_hours: i64) -> bool {
    match Duration::try_hours(badge_hours).and_then(|h| now.checked_sub_signed(h)) {
        Some(cutoff) => uploaded > cutoff,
        None => badge_hours > 0,
    }
}

pub fn count_categories(documents: &[Document]) -> CategoryCounts {
    let mut counts = CategoryCounts::default();
    for doc in documents {
        counts.bump(doc.category);
    }
    counts
}

pub fn summarize(
    documents: &[Document],
    now: DateTime<Utc>,
    config: &IntakeConfig,
) -> CollectionSummary {
    let cards: Vec<DocumentCard> = documents.iter().map(|d| card_for(d, now, config)).collect();
    let same_month = |d: &Document| {
        d.upload_date.year() == now.year() && d.upload_date.month() == now.month()
    };

    let mut recent = cards.clone();
    recent.sort_by(|a, b| compare(&a.document, &b.document, SortKey::Date));
    recent.truncate(config.recent_limit);

    CollectionSummary {
        total_documents: documents.len(),
        expiring_soon: cards
            .iter()
            .filter(|c| c.status == ExpiryStatus::ExpiresSoon)
            .count(),
        expired: cards.iter().filter(|c| c.status == ExpiryStatus::Expired).count(),
        added_this_month: documents.iter().filter(|d| same_month(d)).count(),
        scanned_this_month: documents
            .iter()
            .filter(|d| d.source == DocumentSource::Camera && same_month(d))
            .count(),
        recent,
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

fn compare(a: &Document, b: &Document, key: SortKey) -> Ordering {
    match key {
        SortKey::Date => b.upload_date.cmp(&a.upload_date),
        SortKey::Name => compare_names(&a.name, &b.name),
        SortKey::Category => a.category.as_str().cmp(b.category.as_str()),
        SortKey::Expiry => match (a.expiry_date, b.expiry_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

/// Collation-style comparison: base letters first (accents and case
/// ignored), then accents, then case with lowercase first.
fn compare_names(a: &str, b: &str) -> Ordering {
    base_letters(a)
        .cmp(&base_letters(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| b.cmp(a))
}

/// Lowercased with combining marks stripped, so "Émile" keys as "emile".
fn base_letters(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}
