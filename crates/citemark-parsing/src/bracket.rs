//! Bracket Channel: numeric citation markers found in line text.

use citemark_core::refids::parse_ref_ids;
use citemark_core::{Bibliography, Channel, CitationCandidate, LayoutConfig, LineRecord};
use citemark_layout::{ANCHOR_CHARS, LineText};
use once_cell::sync::Lazy;
use regex::Regex;

/// `[n]`, `[n, m]`, `[n-m; k]` style markers are unambiguous.
pub const SQUARE_CONFIDENCE: f64 = 0.9;

/// `(n)` collides with equation and list numbering.
pub const PAREN_CONFIDENCE: f64 = 0.6;

static SQUARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*\d+(?:\s*[-–—,;]\s*\d+)*\s*\]").unwrap());

static PAREN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\d+(?:\s*[-–—,;]\s*\d+)*\s*\)").unwrap());

/// Scan one line's text for bracketed markers.
pub fn line_candidates(line: &LineRecord, layout: &LayoutConfig) -> Vec<CitationCandidate> {
    let text = LineText::build(line, layout);
    let mut out = Vec::new();

    let patterns: [(&Regex, f64); 2] = [(&*SQUARE_RE, SQUARE_CONFIDENCE), (&*PAREN_RE, PAREN_CONFIDENCE)];
    for (re, confidence) in patterns {
        for m in re.find_iter(&text.text) {
            // IDs past the citation ceiling never parse, so "(2019)" yields nothing
            let ids = parse_ref_ids(m.as_str());
            if ids.is_empty() {
                continue;
            }
            let Some(bbox) = text.bbox_of(line, m.range()) else {
                continue;
            };
            out.push(CitationCandidate {
                channel: Channel::Bracket,
                page: line.page,
                line: line.index,
                bbox,
                raw: m.as_str().to_string(),
                ids,
                confidence,
                anchor_left: text.left_context(m.start(), ANCHOR_CHARS),
            });
        }
    }
    out.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    out
}

/// Bracket-channel candidates for a page. Lines inside the bibliography
/// region are skipped so entry heads are not read as citations.
pub fn bracket_candidates(
    lines: &[LineRecord],
    bibliography: &Bibliography,
    layout: &LayoutConfig,
) -> Vec<CitationCandidate> {
    let candidates: Vec<CitationCandidate> = lines
        .iter()
        .filter(|l| !bibliography.covers_line(l.page, l.index))
        .flat_map(|l| line_candidates(l, layout))
        .collect();
    tracing::trace!(candidates = candidates.len(), "bracket channel");
    candidates
}
