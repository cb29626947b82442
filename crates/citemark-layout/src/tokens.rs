//! Superscript Token Aggregator: flagged characters into citation markers.

use citemark_core::refids::{has_digit, parse_ref_ids};
use citemark_core::{
    BBox, CharRecord, CitationCandidate, Channel, LayoutConfig, LineRecord, SuperscriptConfig,
    SuperscriptFlags, SuperscriptToken,
};

use crate::metrics::PageMetrics;
use crate::spans::{ANCHOR_CHARS, LineText};

/// Confidence of a superscript candidate whose every character was flagged
/// with full confidence.
pub const SUPERSCRIPT_BASE_CONFIDENCE: f64 = 0.65;

struct Run<'a> {
    chars: Vec<&'a CharRecord>,
    confidence: f64,
}

impl Run<'_> {
    fn into_token(self, line: &LineRecord) -> Option<SuperscriptToken> {
        let text: String = self.chars.iter().map(|c| c.text.as_str()).collect();
        if !has_digit(&text) {
            return None;
        }
        Some(SuperscriptToken {
            page: line.page,
            line: line.index,
            chars: self.chars.iter().map(|c| c.id).collect(),
            bbox: BBox::enclosing(self.chars.iter().map(|c| &c.bbox))?,
            text,
            confidence: self.confidence,
        })
    }
}

/// Merge the flagged characters of one line into tokens.
///
/// Two flagged characters join when the horizontal gap between them is
/// less than `token_gap_ratio * body_size`; whitespace glyphs in between do not
/// break a run, any other unflagged glyph does. Runs without digits are
/// discarded.
pub fn line_tokens(
    line: &LineRecord,
    flags: &SuperscriptFlags,
    body_size: f64,
    config: &SuperscriptConfig,
) -> Vec<SuperscriptToken> {
    let max_gap = config.token_gap_ratio * body_size;
    let mut tokens = Vec::new();
    let mut run: Option<Run> = None;

    for c in &line.chars {
        if c.is_whitespace() {
            continue;
        }
        let Some(flag) = flags.get(&c.id) else {
            if let Some(done) = run.take() {
                tokens.extend(done.into_token(line));
            }
            continue;
        };
        let adjacent = run
            .as_ref()
            .and_then(|r| r.chars.last())
            .is_some_and(|last| c.bbox.x0 - last.bbox.x1 < max_gap);
        if adjacent && let Some(r) = run.as_mut() {
            r.chars.push(c);
            r.confidence = r.confidence.min(flag.confidence);
        } else {
            if let Some(done) = run.take() {
                tokens.extend(done.into_token(line));
            }
            run = Some(Run {
                chars: vec![c],
                confidence: flag.confidence,
            });
        }
    }
    if let Some(done) = run {
        tokens.extend(done.into_token(line));
    }
    tokens
}

/// Tokens for every line of a page, using each line's regional body size.
pub fn page_tokens(
    lines: &[LineRecord],
    flags: &SuperscriptFlags,
    metrics: &PageMetrics,
    config: &SuperscriptConfig,
) -> Vec<SuperscriptToken> {
    let tokens: Vec<SuperscriptToken> = lines
        .iter()
        .flat_map(|line| line_tokens(line, flags, metrics.region(line.band).body_size, config))
        .collect();
    tracing::trace!(tokens = tokens.len(), "superscript tokens");
    tokens
}

/// Turn tokens into superscript-channel candidates.
///
/// Tokens whose text does not parse to at least one valid ID (decimals,
/// stray letters, out-of-range values) produce nothing.
pub fn superscript_candidates(
    tokens: &[SuperscriptToken],
    lines: &[LineRecord],
    layout: &LayoutConfig,
) -> Vec<CitationCandidate> {
    tokens
        .iter()
        .filter_map(|token| {
            let ids = parse_ref_ids(&token.text);
            if ids.is_empty() {
                tracing::trace!(page = token.page, line = token.line, text = %token.text, "unparseable token");
                return None;
            }
            let anchor_left = lines
                .iter()
                .find(|l| l.index == token.line)
                .and_then(|line| {
                    let first = token.chars.first()?;
                    let pos = line.chars.iter().position(|c| c.id == *first)?;
                    let text = LineText::build(line, layout);
                    Some(text.left_context(text.offset_of(pos)?, ANCHOR_CHARS))
                })
                .unwrap_or_default();
            Some(CitationCandidate {
                channel: Channel::Superscript,
                page: token.page,
                line: token.line,
                bbox: token.bbox,
                raw: token.text.clone(),
                ids,
                confidence: SUPERSCRIPT_BASE_CONFIDENCE * token.confidence,
                anchor_left,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use citemark_core::{CharId, Rgb, SuperscriptFlag, SuperscriptRule};

    fn ch(index: usize, text: &str, x0: f64, width: f64) -> CharRecord {
        CharRecord {
            id: CharId { page: 2, index },
            text: text.into(),
            bbox: BBox::new(x0, x0 + width, 100.0, 110.0),
            fontname: Some("Times".into()),
            size: 10.0,
            color: Rgb::default(),
            bold: false,
            italic: false,
            upright: true,
        }
    }

    /// Body word at 5pt pitch, then marker glyphs at the given x positions.
    fn marked_line(marker: &[(&str, f64)]) -> (LineRecord, SuperscriptFlags) {
        let mut chars: Vec<CharRecord> = "word"
            .chars()
            .enumerate()
            .map(|(i, c)| ch(i, &c.to_string(), 50.0 + i as f64 * 5.0, 5.0))
            .collect();
        let mut flags = SuperscriptFlags::new();
        for (text, x0) in marker {
            let index = chars.len();
            chars.push(ch(index, text, *x0, 3.0));
            if !text.trim().is_empty() {
                flags.insert(
                    CharId { page: 2, index },
                    SuperscriptFlag { rise: 3.0, rule: SuperscriptRule::Raised, confidence: 1.0 },
                );
            }
        }
        let line = LineRecord {
            page: 2,
            index: 3,
            band: 0,
            column: 0,
            chars,
        };
        (line, flags)
    }

    #[test]
    fn test_adjacent_flagged_chars_merge() {
        let (line, flags) = marked_line(&[("1", 70.0), ("-", 73.5), ("3", 77.0)]);
        let tokens = line_tokens(&line, &flags, 10.0, &SuperscriptConfig::default());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "1-3");
        assert_eq!(tokens[0].line, 3);
        assert_eq!(tokens[0].chars.len(), 3);
        assert_eq!((tokens[0].bbox.x0, tokens[0].bbox.x1), (70.0, 80.0));
    }

    #[test]
    fn test_gap_threshold_scales_with_body_size() {
        // Gap of 7pt: joins under a 10pt body (limit 8), splits under 8pt (limit 6.4).
        let (line, flags) = marked_line(&[("1", 70.0), ("2", 80.0)]);
        let config = SuperscriptConfig::default();
        assert_eq!(line_tokens(&line, &flags, 10.0, &config).len(), 1);
        assert_eq!(line_tokens(&line, &flags, 8.0, &config).len(), 2);
    }

    #[test]
    fn test_gap_equal_to_threshold_splits() {
        // "1" ends at 73; under a 10pt body the limit is 8pt.
        let (line, flags) = marked_line(&[("1", 70.0), ("2", 81.0)]);
        let tokens = line_tokens(&line, &flags, 10.0, &SuperscriptConfig::default());
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "1");
        assert_eq!(tokens[1].text, "2");
    }

    #[test]
    fn test_whitespace_glyph_inside_marker() {
        let (line, flags) = marked_line(&[("1", 70.0), (",", 73.0), (" ", 76.0), ("4", 79.0)]);
        let tokens = line_tokens(&line, &flags, 10.0, &SuperscriptConfig::default());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "1,4");
    }

    #[test]
    fn test_punctuation_only_token_discarded() {
        let (line, flags) = marked_line(&[("*", 70.0)]);
        assert!(line_tokens(&line, &flags, 10.0, &SuperscriptConfig::default()).is_empty());
    }

    #[test]
    fn test_token_confidence_is_weakest_flag() {
        let (line, _) = marked_line(&[("1", 70.0), ("2", 73.0)]);
        let mut flags = SuperscriptFlags::new();
        flags.insert(
            CharId { page: 2, index: 4 },
            SuperscriptFlag { rise: 3.0, rule: SuperscriptRule::Raised, confidence: 1.0 },
        );
        flags.insert(
            CharId { page: 2, index: 5 },
            SuperscriptFlag { rise: 0.0, rule: SuperscriptRule::TrailingFallback, confidence: 0.5 },
        );
        let tokens = line_tokens(&line, &flags, 10.0, &SuperscriptConfig::default());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].confidence, 0.5);

        let candidates = superscript_candidates(&tokens, &[line], &LayoutConfig::default());
        assert_eq!(candidates[0].ids, vec![12]);
        assert!((candidates[0].confidence - SUPERSCRIPT_BASE_CONFIDENCE * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_candidates_expand_ranges_and_carry_anchor() {
        let (line, flags) = marked_line(&[("3", 70.0), ("–", 73.0), ("5", 76.0)]);
        let tokens = line_tokens(&line, &flags, 10.0, &SuperscriptConfig::default());
        let candidates = superscript_candidates(&tokens, &[line], &LayoutConfig::default());
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.ids, vec![3, 4, 5]);
        assert_eq!(c.channel, Channel::Superscript);
        assert_eq!(c.anchor_left, "word");
        assert_eq!(c.confidence, SUPERSCRIPT_BASE_CONFIDENCE);
    }

    #[test]
    fn test_decimal_token_produces_no_candidate() {
        let (line, flags) = marked_line(&[("1", 70.0), (".", 73.0), ("5", 76.0)]);
        let tokens = line_tokens(&line, &flags, 10.0, &SuperscriptConfig::default());
        assert_eq!(tokens.len(), 1);
        assert!(superscript_candidates(&tokens, &[line], &LayoutConfig::default()).is_empty());
    }
}
