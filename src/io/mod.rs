//! Loading and emitting structured documents.

mod format;
pub mod input;
pub mod output;

pub use format::DocumentFormat;
pub use input::{load_document, parse_document_str};
pub use output::{OutputTarget, Report};
