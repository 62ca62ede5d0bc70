//! Ingestion pipeline: upload state machine, format classification, and
//! per-container splitting (spec §4.3).

pub mod ldif;
pub mod pipeline;
pub mod sniff;

pub use pipeline::{process_upload, ProgressEvent, ProgressHub};
pub use sniff::sniff_format;
