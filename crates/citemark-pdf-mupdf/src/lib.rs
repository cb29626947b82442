use std::path::Path;

use mupdf::{Document, Quad, TextPageFlags};

use citemark_core::{BackendError, CharSource, RawChar, RawPage};

/// MuPDF-based implementation of [`CharSource`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (AGPL-3.0) so that the JSON input path does not transitively depend on it.
///
/// The document handle lives only for the duration of
/// [`extract_pages`](CharSource::extract_pages). MuPDF's structured text API
/// does not report font names or fill colors per glyph, so every record
/// carries `fontname: None` and `color: None`; spans built from these records
/// never merge across glyphs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfCharSource;

impl MupdfCharSource {
    pub fn new() -> Self {
        Self
    }
}

/// Axis-aligned box of a glyph quad as `(x0, x1, top, bottom)`.
fn quad_box(q: &Quad) -> (f64, f64, f64, f64) {
    let xs = [q.ul.x, q.ur.x, q.ll.x, q.lr.x];
    let ys = [q.ul.y, q.ur.y, q.ll.y, q.lr.y];
    let min = |v: &[f32]| v.iter().copied().fold(f32::INFINITY, f32::min) as f64;
    let max = |v: &[f32]| v.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    (min(&xs), max(&xs), min(&ys), max(&ys))
}

/// Glyphs whose baseline is not horizontal.
fn is_upright(q: &Quad) -> bool {
    (q.ur.y - q.ul.y).abs() <= 0.01 * (q.ur.x - q.ul.x).abs().max(1.0)
}

impl CharSource for MupdfCharSource {
    fn extract_pages(&self, path: &Path) -> Result<Vec<RawPage>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut pages = Vec::new();
        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let bounds = page
                .bounds()
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

            let (ox, oy) = (bounds.x0 as f64, bounds.y0 as f64);
            let mut chars = Vec::new();
            for block in text_page.blocks() {
                for line in block.lines() {
                    for c in line.chars() {
                        let Some(ch) = c.char() else {
                            continue;
                        };
                        let quad = c.quad();
                        let (x0, x1, top, bottom) = quad_box(&quad);
                        chars.push(RawChar {
                            text: ch.to_string(),
                            x0: x0 - ox,
                            x1: x1 - ox,
                            top: top - oy,
                            bottom: bottom - oy,
                            fontname: None,
                            size: Some(c.size() as f64),
                            color: None,
                            upright: is_upright(&quad),
                        });
                    }
                }
            }
            tracing::trace!(page = pages.len() + 1, chars = chars.len(), "extracted page");
            pages.push(RawPage {
                width: (bounds.x1 - bounds.x0) as f64,
                height: (bounds.y1 - bounds.y0) as f64,
                chars,
            });
        }
        Ok(pages)
    }
}
