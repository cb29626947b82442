use thiserror::Error;

pub mod fusion;
pub mod pipeline;
pub mod summary;

pub use fusion::{FusionStats, fuse_page, id_bound};
pub use pipeline::{
    Analyzer, Cancellation, Completeness, DocumentAnalysis, NeverCancel, PageAnalysis, ProgressEvent,
};
pub use summary::{ReferenceUsage, summarize_references};
// Re-export domain types from core (canonical definitions live there)
pub use citemark_core::{AnalysisConfig, Bibliography, Channel, Occurrence, Preset, RawPage};

/// Per-document failure. Carries a readable cause so a batch caller can
/// report the document and move on.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("could not extract characters: {cause}")]
    Extraction { cause: String },
}
