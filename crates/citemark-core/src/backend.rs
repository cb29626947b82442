use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from character extraction backends.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open document: {0}")]
    OpenError(String),
    #[error("failed to extract characters: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fill color as reported by the extractor: gray, RGB or CMYK components in `0..=1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawColor {
    Gray(f64),
    Components(Vec<f64>),
}

/// One character as delivered by the upstream extraction capability.
///
/// Field names follow pdfplumber's `page.chars` records so dumps from it
/// deserialize directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChar {
    pub text: String,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
    #[serde(default)]
    pub fontname: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default, alias = "non_stroking_color")]
    pub color: Option<RawColor>,
    #[serde(default = "default_upright")]
    pub upright: bool,
}

fn default_upright() -> bool {
    true
}

/// Characters of one page in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub chars: Vec<RawChar>,
}

/// Trait for character extraction backends.
///
/// Implementors own the document handle for the duration of one call and
/// release it before returning; the layout pipeline only ever sees
/// [`RawPage`]s.
pub trait CharSource: Send + Sync {
    /// Extract every page's characters from the document at `path`.
    fn extract_pages(&self, path: &Path) -> Result<Vec<RawPage>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_char_deserializes_pdfplumber_record() {
        let json = r#"{
            "text": "A", "x0": 72.0, "x1": 79.2, "top": 100.0, "bottom": 110.0,
            "fontname": "ABCDEF+Times-Bold", "size": 10.0,
            "non_stroking_color": [0, 0, 1], "upright": true, "adv": 7.2
        }"#;
        let c: RawChar = serde_json::from_str(json).unwrap();
        assert_eq!(c.fontname.as_deref(), Some("ABCDEF+Times-Bold"));
        assert_eq!(c.color, Some(RawColor::Components(vec![0.0, 0.0, 1.0])));
    }

    #[test]
    fn test_raw_char_optional_fields_default() {
        let c: RawChar = serde_json::from_str(
            r#"{"text": "x", "x0": 1, "x1": 2, "top": 3, "bottom": 4, "color": 0.5}"#,
        )
        .unwrap();
        assert!(c.fontname.is_none());
        assert!(c.size.is_none());
        assert!(c.upright);
        assert_eq!(c.color, Some(RawColor::Gray(0.5)));
    }
}
