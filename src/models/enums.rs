use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Category {
    Insurance => "insurance",
    Identity => "identity",
    Vehicle => "vehicle",
    Medical => "medical",
    Financial => "financial",
    Legal => "legal",
});

impl Category {
    /// The closed taxonomy, in display order.
    pub const ALL: [Category; 6] = [
        Category::Insurance,
        Category::Identity,
        Category::Vehicle,
        Category::Medical,
        Category::Financial,
        Category::Legal,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Insurance => "Insurance",
            Self::Identity => "Identity",
            Self::Vehicle => "Vehicle",
            Self::Medical => "Medical",
            Self::Financial => "Financial",
            Self::Legal => "Legal",
        }
    }
}

str_enum!(ProcessingState {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

impl ProcessingState {
    /// Completed and failed are final; nothing moves a document out of them.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

str_enum!(ExpiryStatus {
    Active => "active",
    ExpiresSoon => "expires-soon",
    Expired => "expired",
});

str_enum!(DocumentSource {
    Camera => "camera",
    Upload => "upload",
});

str_enum!(SortKey {
    Date => "date",
    Name => "name",
    Category => "category",
    Expiry => "expiry",
});

impl Default for SortKey {
    fn default() -> Self {
        Self::Date
    }
}

str_enum!(ViewMode {
    Grid => "grid",
    List => "list",
});

impl Default for ViewMode {
    fn default() -> Self {
        Self::Grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn category_round_trip() {
        for (variant, s) in [
            (Category::Insurance, "insurance"),
            (Category::Identity, "identity"),
            (Category::Vehicle, "vehicle"),
            (Category::Medical, "medical"),
            (Category::Financial, "financial"),
            (Category::Legal, "legal"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(Category::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn category_all_covers_taxonomy() {
        assert_eq!(Category::ALL.len(), 6);
        assert_eq!(Category::ALL[0], Category::Insurance);
        assert_eq!(Category::Medical.label(), "Medical");
    }

    #[test]
    fn expiry_status_uses_kebab_identifier() {
        assert_eq!(ExpiryStatus::ExpiresSoon.as_str(), "expires-soon");
        assert_eq!(
            ExpiryStatus::from_str("expires-soon").unwrap(),
            ExpiryStatus::ExpiresSoon
        );
        let json = serde_json::to_string(&ExpiryStatus::ExpiresSoon).unwrap();
        assert_eq!(json, "\"expires-soon\"");
    }

    #[test]
    fn processing_state_settled() {
        assert!(!ProcessingState::Pending.is_settled());
        assert!(!ProcessingState::Processing.is_settled());
        assert!(ProcessingState::Completed.is_settled());
        assert!(ProcessingState::Failed.is_settled());
    }

    #[test]
    fn sort_and_view_defaults() {
        assert_eq!(SortKey::default(), SortKey::Date);
        assert_eq!(ViewMode::default(), ViewMode::Grid);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(Category::from_str("all").is_err());
        assert!(SortKey::from_str("size").is_err());
        let err = Category::from_str("pets").unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidEnum {
                field: "Category".into(),
                value: "pets".into()
            }
        );
    }
}
