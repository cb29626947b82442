//! Layout Analyzer: superscript detection from character geometry alone.
//!
//! A character is flagged when any rule fires (union):
//! - **Unicode**: its code point is a superscript form.
//! - **Raised**: its mid-point sits above the line's body mid-line by more
//!   than `rise_ratio * body_size`, and it is no larger than body text.
//! - **Attached**: it directly follows a non-flagged glyph and both its top
//!   and bottom edges sit above that neighbor's by a fraction of x-height.
//! - **Trailing fallback**: a short run of abnormally small glyphs ending the
//!   line, flagged with lower confidence.
//!
//! Bracket and parenthesis glyphs, and anything enclosed by a bracket pair,
//! are left to the bracket channel.

use citemark_core::refids::is_unicode_superscript;
use citemark_core::{
    CharRecord, LineRecord, SuperscriptConfig, SuperscriptFlag, SuperscriptFlags, SuperscriptRule,
    mode_size,
};

use crate::metrics::{PageMetrics, RegionMetrics, page_metrics};

const RAISED_CONFIDENCE: f64 = 1.0;
const UNICODE_CONFIDENCE: f64 = 1.0;
const ATTACHED_CONFIDENCE: f64 = 0.85;

/// Overlap allowed between an attached glyph and its neighbor, in points.
const ATTACH_MAX_OVERLAP: f64 = 1.0;

/// Body mid-line characters must be within this fraction of the body size.
const BODY_SIZE_TOLERANCE: f64 = 0.15;

/// Trailing glyphs may sit this far below the line baseline, in points.
const BASELINE_TOLERANCE: f64 = 0.5;

/// Flags and the metrics they were computed against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuperscriptDetection {
    pub flags: SuperscriptFlags,
    pub metrics: PageMetrics,
}

/// Detect superscript characters on one page.
///
/// Metrics are first computed over every character, then recomputed with
/// the provisional flags excluded, and detection runs again against the
/// refined metrics.
pub fn detect_superscripts(lines: &[LineRecord], config: &SuperscriptConfig) -> SuperscriptDetection {
    let provisional_metrics = page_metrics(lines, &SuperscriptFlags::new());
    let provisional = flag_lines(lines, &provisional_metrics, config);

    let metrics = page_metrics(lines, &provisional);
    let flags = flag_lines(lines, &metrics, config);
    tracing::trace!(
        provisional = provisional.len(),
        flagged = flags.len(),
        "superscript detection"
    );
    SuperscriptDetection { flags, metrics }
}

fn flag_lines(lines: &[LineRecord], metrics: &PageMetrics, config: &SuperscriptConfig) -> SuperscriptFlags {
    let mut flags = SuperscriptFlags::new();
    for line in lines {
        flags.extend(flag_line(line, &metrics.region(line.band), config));
    }
    flags
}

/// Vertical reference for one line: the most frequent mid-point among
/// body-sized glyphs, falling back to all glyphs.
fn body_mid(line: &LineRecord, body_size: f64) -> f64 {
    let printable = || line.chars.iter().filter(|c| !c.is_whitespace());
    let body = printable()
        .filter(|c| (c.size - body_size).abs() <= BODY_SIZE_TOLERANCE * body_size)
        .map(|c| c.bbox.mid_y());
    mode_size(body)
        .or_else(|| {
            let line_size = line.body_size();
            mode_size(
                printable()
                    .filter(|c| (c.size - line_size).abs() <= BODY_SIZE_TOLERANCE * line_size)
                    .map(|c| c.bbox.mid_y()),
            )
        })
        .unwrap_or_else(|| line.bbox().mid_y())
}

fn is_bracket_glyph(c: &CharRecord) -> bool {
    c.text.chars().any(|ch| matches!(ch, '[' | ']' | '(' | ')' | '{' | '}'))
}

/// Positions of characters enclosed by a `[`..`]` pair containing only
/// digits, separators and spaces.
fn bracket_enclosed(line: &LineRecord) -> Vec<bool> {
    let mut enclosed = vec![false; line.chars.len()];
    let mut open: Option<usize> = None;
    for (i, c) in line.chars.iter().enumerate() {
        let t = c.text.as_str();
        if t == "[" {
            open = Some(i);
        } else if t == "]" {
            if let Some(start) = open.take() {
                enclosed[start + 1..i].iter_mut().for_each(|e| *e = true);
            }
        } else if open.is_some() {
            let citation_like = c
                .text
                .chars()
                .all(|ch| ch.is_ascii_digit() || ch.is_whitespace() || ",;-–—".contains(ch));
            if !citation_like {
                open = None;
            }
        }
    }
    enclosed
}

/// Apply every rule to one line against its region's metrics.
pub fn flag_line(line: &LineRecord, region: &RegionMetrics, config: &SuperscriptConfig) -> SuperscriptFlags {
    let mut flags = SuperscriptFlags::new();
    let body = region.body_size;
    let mid = body_mid(line, body);
    let enclosed = bracket_enclosed(line);
    let eligible = |i: usize, c: &CharRecord| !c.is_whitespace() && !is_bracket_glyph(c) && !enclosed[i];

    let mut prev_plain: Option<&CharRecord> = None;
    for (i, c) in line.chars.iter().enumerate() {
        if c.is_whitespace() {
            prev_plain = None;
            continue;
        }
        if !eligible(i, c) {
            prev_plain = Some(c);
            continue;
        }
        let rise = mid - c.bbox.mid_y();
        let mut flag: Option<SuperscriptFlag> = None;
        let mut raise = |rule: SuperscriptRule, confidence: f64| {
            if flag.is_none_or(|f: SuperscriptFlag| confidence > f.confidence) {
                flag = Some(SuperscriptFlag { rise, rule, confidence });
            }
        };

        if c.first_char().is_some_and(is_unicode_superscript) {
            raise(SuperscriptRule::Unicode, UNICODE_CONFIDENCE);
        }
        if rise > config.rise_ratio * body && c.size <= body * config.raised_size_ratio {
            raise(SuperscriptRule::Raised, RAISED_CONFIDENCE);
        }
        if let Some(n) = prev_plain {
            let gap = c.bbox.x0 - n.bbox.x1;
            let lift = config.attach_rise_ratio * region.x_height;
            if (-ATTACH_MAX_OVERLAP..=config.attach_gap_ratio * body).contains(&gap)
                && c.size <= n.size * config.attach_size_ratio
                && n.bbox.top - c.bbox.top > lift
                && n.bbox.bottom - c.bbox.bottom > lift
            {
                raise(SuperscriptRule::Attached, ATTACHED_CONFIDENCE);
            }
        }

        match flag {
            Some(f) => flags.insert(c.id, f),
            None => prev_plain = Some(c),
        }
    }

    flag_trailing(line, body, mid, &enclosed, &mut flags, config);
    flags
}

/// Fallback sweep: the last few printable glyphs of a line, all strictly
/// smaller than `trailing_fallback_size_ratio * body`, not below the
/// baseline, and preceded by at least one normal-sized glyph.
fn flag_trailing(
    line: &LineRecord,
    body: f64,
    mid: f64,
    enclosed: &[bool],
    flags: &mut SuperscriptFlags,
    config: &SuperscriptConfig,
) {
    if config.trailing_fallback_max_chars == 0 {
        return;
    }
    let limit = body * config.trailing_fallback_size_ratio;
    let floor = line.baseline() + BASELINE_TOLERANCE;
    let printable: Vec<(usize, &CharRecord)> = line
        .chars
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace())
        .collect();

    let run: Vec<(usize, &CharRecord)> = printable
        .iter()
        .rev()
        .take_while(|(i, c)| {
            c.size < limit && !is_bracket_glyph(c) && !enclosed[*i] && c.bbox.bottom <= floor
        })
        .copied()
        .collect();

    if run.is_empty() || run.len() > config.trailing_fallback_max_chars || run.len() == printable.len() {
        return;
    }
    for (_, c) in run {
        if !flags.is_flagged(&c.id) {
            flags.insert(
                c.id,
                SuperscriptFlag {
                    rise: mid - c.bbox.mid_y(),
                    rule: SuperscriptRule::TrailingFallback,
                    confidence: config.trailing_fallback_confidence,
                },
            );
        }
    }
}
