pub mod document;
pub mod enums;
pub mod filters;

pub use document::*;
pub use enums::*;
pub use filters::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid value for {field}: {value:?}")]
    InvalidEnum { field: String, value: String },

    #[error("Unrecognized date: {0:?}")]
    InvalidDate(String),
}
