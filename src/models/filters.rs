use serde::{Deserialize, Serialize};

use super::enums::{Category, ExpiryStatus, SortKey, ViewMode};
use super::ModelError;

/// Category chip selection. `"all"` is not a category, so it gets its own arm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(c) => *c == category,
        }
    }
}

impl std::str::FromStr for CategoryFilter {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

/// Query parameters for the collection projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentQuery {
    pub search: String,
    pub category: CategoryFilter,
    /// `None` disables status filtering.
    pub status: Option<ExpiryStatus>,
    pub sort_key: SortKey,
    pub view_mode: ViewMode,
}

impl DocumentQuery {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_category(mut self, category: CategoryFilter) -> Self {
        self.category = category;
        self
    }

    pub fn with_status(mut self, status: ExpiryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn sorted_by(mut self, key: SortKey) -> Self {
        self.sort_key = key;
        self
    }
}
