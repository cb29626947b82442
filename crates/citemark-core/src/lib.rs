//! Shared data model for citemark: character, line and span records, citation
//! candidates and occurrences, bibliography entries, configuration, and the
//! adapter that normalizes raw extractor output.

pub mod adapter;
pub mod backend;
pub mod config;
pub mod config_file;
pub mod refids;
pub mod types;

pub use adapter::{PageChars, adapt_page};
pub use backend::{BackendError, CharSource, RawChar, RawColor, RawPage};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, BibliographyConfig, ConfigError, FusionConfig,
    LayoutConfig, Preset, RunningHeaderConfig, SuperscriptConfig,
};
pub use refids::{normalize_ref_text, parse_ref_ids};
pub use types::{
    BBox, BibRegion, Bibliography, Channel, CharId, CharRecord, CitationCandidate, LineRecord,
    Occurrence, RefEntry, Rgb, SuperscriptFlag, SuperscriptFlags, SuperscriptRule,
    SuperscriptToken, TextSpan, mode_size,
};
