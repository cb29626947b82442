//! Page geometry for citemark: reading-order line reconstruction, styled
//! spans, per-region body metrics, superscript detection and superscript
//! token aggregation.

pub mod columns;
pub mod lines;
pub mod metrics;
pub mod running;
pub mod spans;
pub mod superscript;
pub mod tokens;

pub use lines::{PageLayout, reconstruct_lines};
pub use metrics::{BodyMetrics, PageMetrics, RegionMetrics, page_metrics};
pub use running::suppress_running_lines;
pub use spans::{ANCHOR_CHARS, LineText, aggregate_spans, is_word_gap, page_text};
pub use superscript::{SuperscriptDetection, detect_superscripts, flag_line};
pub use tokens::{SUPERSCRIPT_BASE_CONFIDENCE, line_tokens, page_tokens, superscript_candidates};
