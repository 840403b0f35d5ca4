//! File path: select, validate, stage, transfer the primary file, extract.

pub mod format;
pub mod session;

pub use format::{format_file_size, sanitize_filename};
pub use session::*;
