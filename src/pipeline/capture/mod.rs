//! Camera path: acquire a live feed, detect a document, capture one frame,
//! extract, and hand back a draft.

pub mod detection;
pub mod media;
pub mod session;

pub use detection::*;
pub use media::*;
pub use session::*;
