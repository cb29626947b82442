use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity of a character within a document: 1-based page number plus the
/// character's position in the page's extraction order.
///
/// Auxiliary annotations (superscript flags) are keyed by this instead of being
/// stored on the [`CharRecord`] itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharId {
    pub page: usize,
    pub index: usize,
}

/// Axis-aligned box in PDF points, top-left origin (`top < bottom`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
}

impl BBox {
    pub fn new(x0: f64, x1: f64, top: f64, bottom: f64) -> Self {
        Self {
            x0: x0.min(x1),
            x1: x0.max(x1),
            top: top.min(bottom),
            bottom: top.max(bottom),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn mid_x(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn mid_y(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            x1: self.x1.max(other.x1),
            top: self.top.min(other.top),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Whether the horizontal extents share any interval.
    pub fn overlaps_x(&self, other: &BBox) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1
    }

    /// Union of a sequence of boxes, `None` when empty.
    pub fn enclosing<'a>(boxes: impl IntoIterator<Item = &'a BBox>) -> Option<BBox> {
        boxes.into_iter().fold(None, |acc, b| match acc {
            None => Some(*b),
            Some(a) => Some(a.union(b)),
        })
    }
}

/// 8-bit RGB fill color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A single extracted character. Immutable once produced by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharRecord {
    pub id: CharId,
    /// Usually one `char`; ligatures may expand to several.
    pub text: String,
    pub bbox: BBox,
    /// `None` when the extractor could not report a font.
    pub fontname: Option<String>,
    pub size: f64,
    pub color: Rgb,
    pub bold: bool,
    pub italic: bool,
    pub upright: bool,
}

impl CharRecord {
    pub fn page(&self) -> usize {
        self.id.page
    }

    pub fn is_whitespace(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }

    pub fn first_char(&self) -> Option<char> {
        self.text.chars().next()
    }
}

/// One reading line: characters sorted left to right, all from one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub page: usize,
    /// Position of the line in the page's final reading order.
    pub index: usize,
    /// Vertical band the line was reconstructed in.
    pub band: usize,
    /// Column within the band (`0` for single-column bands).
    pub column: usize,
    pub chars: Vec<CharRecord>,
}

impl LineRecord {
    /// Concatenated character text with no recovered whitespace.
    pub fn raw_text(&self) -> String {
        self.chars.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn bbox(&self) -> BBox {
        BBox::enclosing(self.chars.iter().map(|c| &c.bbox)).unwrap_or_default()
    }

    /// Most frequent font size on the line, rounded to 0.1pt.
    pub fn body_size(&self) -> f64 {
        mode_size(self.chars.iter().filter(|c| !c.is_whitespace()).map(|c| c.size)).unwrap_or(0.0)
    }

    /// Most frequent bottom edge among body-sized characters.
    pub fn baseline(&self) -> f64 {
        let body = self.body_size();
        let bottoms = self
            .chars
            .iter()
            .filter(|c| !c.is_whitespace() && (c.size - body).abs() < 0.15)
            .map(|c| c.bbox.bottom);
        mode_size(bottoms).unwrap_or_else(|| self.bbox().bottom)
    }
}

/// Mode of values rounded to 0.1, ties resolved toward the larger value.
pub fn mode_size(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for v in values {
        if v.is_finite() {
            *counts.entry((v * 10.0).round() as i64).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(key, n)| (n, key))
        .map(|(key, _)| key as f64 / 10.0)
}

/// Contiguous run of same-style characters on one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub page: usize,
    pub line: usize,
    /// Span text, including any single space recovered before the next span.
    pub text: String,
    pub chars: Vec<CharId>,
    pub bbox: BBox,
    pub fontname: Option<String>,
    pub size: f64,
    pub color: Rgb,
    pub bold: bool,
    pub italic: bool,
}

/// Which geometric rule raised a superscript flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuperscriptRule {
    Unicode,
    Raised,
    Attached,
    TrailingFallback,
}

/// Superscript annotation for one character.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperscriptFlag {
    /// Mid-point rise above the regional body line, in points.
    pub rise: f64,
    /// Strongest rule that fired; flags are a union of all rules.
    pub rule: SuperscriptRule,
    pub confidence: f64,
}

/// Auxiliary map from character identity to its superscript flag.
///
/// Characters absent from the map are not flagged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuperscriptFlags {
    flags: BTreeMap<CharId, SuperscriptFlag>,
}

impl SuperscriptFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a flag. When the character is already flagged, the higher
    /// confidence wins.
    pub fn insert(&mut self, id: CharId, flag: SuperscriptFlag) {
        self.flags
            .entry(id)
            .and_modify(|existing| {
                if flag.confidence > existing.confidence {
                    *existing = flag;
                }
            })
            .or_insert(flag);
    }

    pub fn get(&self, id: &CharId) -> Option<&SuperscriptFlag> {
        self.flags.get(id)
    }

    pub fn is_flagged(&self, id: &CharId) -> bool {
        self.flags.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CharId, &SuperscriptFlag)> {
        self.flags.iter()
    }

    pub fn extend(&mut self, other: SuperscriptFlags) {
        for (id, flag) in other.flags {
            self.insert(id, flag);
        }
    }
}

/// Group of flagged characters on one line forming one candidate marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperscriptToken {
    pub page: usize,
    /// Index of the owning [`LineRecord`].
    pub line: usize,
    pub chars: Vec<CharId>,
    pub text: String,
    pub bbox: BBox,
    /// Lowest flag confidence among the token's characters.
    pub confidence: f64,
}

/// An independent detection method contributing candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Superscript,
    Bracket,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Superscript => "superscript",
            Channel::Bracket => "bracket",
        }
    }
}

/// A citation marker proposed by one channel, before fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationCandidate {
    pub channel: Channel,
    pub page: usize,
    pub line: usize,
    pub bbox: BBox,
    /// Marker text as it appeared (`"1-3"`, `"[7]"`).
    pub raw: String,
    pub ids: Vec<u32>,
    pub confidence: f64,
    /// Same-line text immediately preceding the marker.
    pub anchor_left: String,
}

/// One bibliography entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefEntry {
    pub id: u32,
    pub text: String,
    pub page: usize,
    pub line: usize,
    /// Whether the entry head was `[n]` rather than `n.`.
    pub bracketed: bool,
}

/// Span of lines the bibliography was read from, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibRegion {
    pub start: (usize, usize),
    pub end: (usize, usize),
}

impl BibRegion {
    /// Whether `(page, line)` falls inside the region.
    pub fn contains(&self, page: usize, line: usize) -> bool {
        (page, line) >= self.start && (page, line) <= self.end
    }
}

/// Parsed reference list. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bibliography {
    entries: Vec<RefEntry>,
    region: Option<BibRegion>,
}

impl Bibliography {
    /// Build from entries in document order. Later duplicates of an ID are
    /// dropped.
    pub fn new(entries: Vec<RefEntry>, region: Option<BibRegion>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let entries = entries.into_iter().filter(|e| seen.insert(e.id)).collect();
        Self { entries, region }
    }

    pub fn entries(&self) -> &[RefEntry] {
        &self.entries
    }

    pub fn region(&self) -> Option<BibRegion> {
        self.region
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest valid entry ID, `0` for an empty bibliography.
    pub fn max_id(&self) -> u32 {
        self.entries.iter().map(|e| e.id).max().unwrap_or(0)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: u32) -> Option<&RefEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Reliable bibliographies enable the unlinked penalty.
    pub fn is_reliable(&self, min_entries: usize) -> bool {
        min_entries > 0 && self.entries.len() >= min_entries
    }

    /// Whether a line belongs to the reference list region.
    pub fn covers_line(&self, page: usize, line: usize) -> bool {
        self.region.is_some_and(|r| r.contains(page, line))
    }
}

/// A deduplicated, validated citation instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Numeric ID as written in the marker.
    pub cited_id: u32,
    /// Resolved bibliography entry ID, `None` when unlinked.
    pub entry_id: Option<u32>,
    pub page: usize,
    pub line: usize,
    pub bbox: BBox,
    pub confidence: f64,
    /// Channels that produced this occurrence, sorted and unique.
    pub channels: Vec<Channel>,
    pub raw: String,
    pub anchor_left: String,
}

impl Occurrence {
    pub fn is_linked(&self) -> bool {
        self.entry_id.is_some()
    }

    /// Whether more than one channel agreed on this occurrence.
    pub fn is_corroborated(&self) -> bool {
        self.channels.len() > 1
    }
}
