use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;

// Re-export domain types for convenience
pub use citemark_core::{BackendError, CharSource, RawPage};
use citemark_engine::{AnalysisError, Analyzer, Cancellation, DocumentAnalysis, ProgressEvent};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("PDF extraction error: {0}")]
    Pdf(#[from] BackendError),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed character dump: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(not(feature = "pdf"))]
    #[error("PDF support not compiled in (enable the `pdf` feature of citemark-ingest)")]
    NoPdfSupport,
}

/// Load the per-page character stream of a document.
///
/// Dispatches on file extension:
/// - `.json` → a character dump, `[{width, height, chars: [...]}, ...]`
/// - anything else → PDF extraction (requires `pdf` feature / mupdf)
pub fn load_pages(path: &Path) -> Result<Vec<RawPage>, IngestError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let pages = match ext.as_str() {
        "json" => load_json(path)?,
        _ => extract_pdf(path)?,
    };
    tracing::debug!(path = %path.display(), pages = pages.len(), "loaded document");
    Ok(pages)
}

/// Read a JSON character dump.
pub fn load_json(path: &Path) -> Result<Vec<RawPage>, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(feature = "pdf")]
fn extract_pdf(path: &Path) -> Result<Vec<RawPage>, IngestError> {
    let source = citemark_pdf_mupdf::MupdfCharSource::new();
    Ok(source.extract_pages(path)?)
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_path: &Path) -> Result<Vec<RawPage>, IngestError> {
    Err(IngestError::NoPdfSupport)
}

/// Load and analyze one document.
///
/// Loading failures become [`AnalysisError::Extraction`] so a batch caller
/// can report the document and continue with the next.
pub fn analyze_path(
    path: &Path,
    analyzer: &Analyzer,
    cancel: &dyn Cancellation,
    progress: impl Fn(ProgressEvent),
) -> Result<DocumentAnalysis, AnalysisError> {
    let pages = load_pages(path).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "document skipped");
        AnalysisError::Extraction { cause: e.to_string() }
    })?;
    Ok(analyzer.analyze(&pages, cancel, progress))
}
