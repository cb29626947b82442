//! Span Aggregator: styled runs and recovered whitespace for one line.

use std::ops::Range;

use citemark_core::{BBox, CharRecord, LayoutConfig, LineRecord, Rgb, TextSpan};

/// Characters of preceding text kept as a marker's anchor.
pub const ANCHOR_CHARS: usize = 32;

/// Style identity of a character. Size is rounded to 0.1pt.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StyleKey {
    font: String,
    size_tenths: i64,
    color: Rgb,
    bold: bool,
    italic: bool,
}

impl StyleKey {
    /// `None` when font metadata is missing; such characters never merge.
    fn of(c: &CharRecord) -> Option<Self> {
        Some(Self {
            font: c.fontname.clone()?,
            size_tenths: (c.size * 10.0).round() as i64,
            color: c.color,
            bold: c.bold,
            italic: c.italic,
        })
    }
}

/// Whether the horizontal gap between two neighboring characters is wide
/// enough to be a word break.
///
/// The threshold is `max(size * gap_factor, min_word_gap)` using the larger
/// of the two font sizes.
pub fn is_word_gap(prev: &CharRecord, cur: &CharRecord, config: &LayoutConfig) -> bool {
    if prev.is_whitespace() || cur.is_whitespace() {
        return false;
    }
    let size = prev.size.max(cur.size);
    let threshold = (size * config.gap_factor).max(config.min_word_gap);
    cur.bbox.x0 - prev.bbox.x1 > threshold
}

/// Aggregate a line's characters into styled spans.
///
/// Consecutive characters merge while their style key matches. A recovered
/// space is appended to the span before a word gap; when the gap falls inside
/// a style run, the space goes into the run's text.
pub fn aggregate_spans(line: &LineRecord, config: &LayoutConfig) -> Vec<TextSpan> {
    let mut spans: Vec<TextSpan> = Vec::new();
    let mut current_key: Option<StyleKey> = None;
    let mut prev: Option<&CharRecord> = None;

    for c in &line.chars {
        let key = StyleKey::of(c);
        let gap = prev.is_some_and(|p| is_word_gap(p, c, config));
        let same_style = key.is_some() && key == current_key;

        if same_style && let Some(span) = spans.last_mut() {
            if gap {
                span.text.push(' ');
            }
            span.text.push_str(&c.text);
            span.chars.push(c.id);
            span.bbox = span.bbox.union(&c.bbox);
        } else {
            if gap && let Some(span) = spans.last_mut() {
                span.text.push(' ');
            }
            spans.push(TextSpan {
                page: line.page,
                line: line.index,
                text: c.text.clone(),
                chars: vec![c.id],
                bbox: c.bbox,
                fontname: c.fontname.clone(),
                size: c.size,
                color: c.color,
                bold: c.bold,
                italic: c.italic,
            });
        }
        current_key = key;
        prev = Some(c);
    }
    spans
}

/// Reconstructed line text with a map from byte offsets back to characters.
#[derive(Debug, Clone, PartialEq)]
pub struct LineText {
    pub text: String,
    /// `(byte offset, char position in the line)` for every character, in
    /// order. Recovered spaces have no entry.
    offsets: Vec<(usize, usize)>,
}

impl LineText {
    /// Build the text of `line`, inserting one space at every word gap.
    pub fn build(line: &LineRecord, config: &LayoutConfig) -> Self {
        let mut text = String::new();
        let mut offsets = Vec::with_capacity(line.chars.len());
        let mut prev: Option<&CharRecord> = None;
        for (pos, c) in line.chars.iter().enumerate() {
            if prev.is_some_and(|p| is_word_gap(p, c, config)) {
                text.push(' ');
            }
            offsets.push((text.len(), pos));
            text.push_str(&c.text);
            prev = Some(c);
        }
        Self { text, offsets }
    }

    /// Positions of the characters whose text starts inside `range`.
    pub fn chars_in(&self, range: Range<usize>) -> impl Iterator<Item = usize> + '_ {
        self.offsets
            .iter()
            .filter(move |(offset, _)| range.contains(offset))
            .map(|(_, pos)| *pos)
    }

    /// Byte offset at which the character at line position `pos` starts.
    pub fn offset_of(&self, pos: usize) -> Option<usize> {
        self.offsets.iter().find(|(_, p)| *p == pos).map(|(offset, _)| *offset)
    }

    /// Bounding box of the characters inside `range`.
    pub fn bbox_of(&self, line: &LineRecord, range: Range<usize>) -> Option<BBox> {
        BBox::enclosing(self.chars_in(range).filter_map(|pos| line.chars.get(pos)).map(|c| &c.bbox))
    }

    /// Up to `max_chars` characters of text immediately before byte `offset`,
    /// trimmed.
    pub fn left_context(&self, offset: usize, max_chars: usize) -> String {
        let head = self.text.get(..offset).unwrap_or("");
        let tail: Vec<char> = head.chars().rev().take(max_chars).collect();
        tail.into_iter().rev().collect::<String>().trim().to_string()
    }
}

/// Plain text of a page, one reconstructed line per row.
pub fn page_text(lines: &[LineRecord], config: &LayoutConfig) -> String {
    lines
        .iter()
        .map(|l| LineText::build(l, config).text)
        .collect::<Vec<_>>()
        .join("\n")
}
