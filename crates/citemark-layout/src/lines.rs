//! Line Reconstructor: clusters a page's characters into reading-order lines.

use citemark_core::{CharRecord, LayoutConfig, LineRecord, PageChars, mode_size};

use crate::columns::{band_boundaries, band_of, find_gutter};

/// Lines narrower than this never get the formula tolerance; too few glyphs
/// to judge density.
const MIN_FORMULA_CHARS: usize = 4;

/// Smallest clustering tolerance in points.
const MIN_TOLERANCE: f64 = 1.0;

/// A raised/lowered cluster is attached to a neighbor line whose center lies
/// within this multiple of the neighbor's font size.
const ATTACH_CENTER_RATIO: f64 = 0.7;

/// An attachable cluster's size must be at most this fraction of the neighbor's.
const ATTACH_SIZE_RATIO: f64 = 0.95;

/// Horizontal slack, relative to neighbor size, when checking that an
/// attachable cluster touches its neighbor.
const ATTACH_GAP_RATIO: f64 = 0.6;

/// Clusters with more printable glyphs are real lines, never markers.
const MAX_ATTACH_CHARS: usize = 16;

/// Clusters up to this many glyphs may attach even when set in the body
/// font size, as long as they touch the neighbor horizontally.
const MAX_SAME_SIZE_ATTACH_CHARS: usize = 4;

/// Reconstructed lines of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub number: usize,
    pub width: f64,
    pub height: f64,
    pub lines: Vec<LineRecord>,
}

impl PageLayout {
    /// Renumber lines so `LineRecord::index` matches position.
    pub fn reindex(&mut self) {
        for (i, line) in self.lines.iter_mut().enumerate() {
            line.index = i;
        }
    }
}

/// Cluster one page into ordered lines.
///
/// Page margins are excluded, the page is cut into bands, each band is split
/// at a gutter when one exists, and each resulting stream is clustered by
/// vertical proximity. Output order is band by band, column-major within a
/// band, top to bottom within a column.
pub fn reconstruct_lines(page: &PageChars, config: &LayoutConfig) -> PageLayout {
    let chars: Vec<&CharRecord> = page
        .chars
        .iter()
        .filter(|c| !in_margin(c, page.height, config))
        .collect();

    let tolerance = page_tolerance(&chars, config);
    let bounds = band_boundaries(&chars, page.height, &config.region_splits);

    let mut lines = Vec::new();
    for band in 0..=bounds.len() {
        let band_chars: Vec<&CharRecord> = chars
            .iter()
            .copied()
            .filter(|c| band_of(c, &bounds) == band)
            .collect();
        if band_chars.is_empty() {
            continue;
        }

        let gutter = if config.enable_two_column_detect {
            find_gutter(&band_chars, page.width, config.min_gutter_ratio)
        } else {
            None
        };

        let streams: Vec<Vec<&CharRecord>> = match gutter {
            Some(x) => {
                tracing::trace!(page = page.number, band, gutter = x, "two-column band");
                let (left, right): (Vec<&CharRecord>, Vec<&CharRecord>) =
                    band_chars.into_iter().partition(|c| c.bbox.mid_x() < x);
                vec![left, right]
            }
            None => vec![band_chars],
        };

        for (column, stream) in streams.into_iter().enumerate() {
            for cluster in cluster_stream(&stream, tolerance, config) {
                lines.push(LineRecord {
                    page: page.number,
                    index: 0,
                    band,
                    column,
                    chars: cluster,
                });
            }
        }
    }

    let mut layout = PageLayout {
        number: page.number,
        width: page.width,
        height: page.height,
        lines,
    };
    layout.reindex();
    tracing::debug!(
        page = page.number,
        lines = layout.lines.len(),
        bands = bounds.len() + 1,
        "reconstructed lines"
    );
    layout
}

fn in_margin(c: &CharRecord, height: f64, config: &LayoutConfig) -> bool {
    let header = height * config.ignore_header_ratio;
    let footer = height * (1.0 - config.ignore_footer_ratio);
    (config.ignore_header_ratio > 0.0 && c.bbox.bottom <= header)
        || (config.ignore_footer_ratio > 0.0 && c.bbox.top >= footer)
}

/// Tolerance from the smallest printable font size on the page.
fn page_tolerance(chars: &[&CharRecord], config: &LayoutConfig) -> f64 {
    let smallest = chars
        .iter()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.size)
        .fold(f64::INFINITY, f64::min);
    if smallest.is_finite() {
        (smallest * config.line_overlap_ratio).max(MIN_TOLERANCE)
    } else {
        MIN_TOLERANCE
    }
}

struct Cluster<'a> {
    chars: Vec<&'a CharRecord>,
    center_sum: f64,
}

impl<'a> Cluster<'a> {
    fn new(c: &'a CharRecord) -> Self {
        Self {
            center_sum: c.bbox.mid_y(),
            chars: vec![c],
        }
    }

    fn center(&self) -> f64 {
        self.center_sum / self.chars.len() as f64
    }

    fn push(&mut self, c: &'a CharRecord) {
        self.center_sum += c.bbox.mid_y();
        self.chars.push(c);
    }

    fn absorb(&mut self, other: Cluster<'a>) {
        self.center_sum += other.center_sum;
        self.chars.extend(other.chars);
    }

    fn printable(&self) -> impl Iterator<Item = &&'a CharRecord> {
        self.chars.iter().filter(|c| !c.is_whitespace())
    }

    fn size(&self) -> f64 {
        mode_size(self.printable().map(|c| c.size)).unwrap_or(0.0)
    }

    fn x_extent(&self) -> (f64, f64) {
        self.printable().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.bbox.x0), hi.max(c.bbox.x1))
        })
    }

    fn is_formula_dense(&self, ratio: f64) -> bool {
        let total = self.printable().count();
        if total < MIN_FORMULA_CHARS {
            return false;
        }
        let dense = self.printable().filter(|c| is_formula_glyph(c)).count();
        dense as f64 / total as f64 >= ratio
    }
}

/// Italic glyphs, math-font glyphs and operator symbols.
fn is_formula_glyph(c: &CharRecord) -> bool {
    if c.italic {
        return true;
    }
    if let Some(font) = c.fontname.as_deref() {
        let lower = font.to_ascii_lowercase();
        if ["math", "symbol", "cmmi", "cmsy", "cmex", "msbm"]
            .iter()
            .any(|k| lower.contains(k))
        {
            return true;
        }
    }
    c.text.chars().any(|ch| {
        matches!(ch, '=' | '+' | '×' | '÷' | '^' | '_' | '|' | '<' | '>' | '±' | '\u{2200}'..='\u{22FF}' | '\u{0391}'..='\u{03C9}')
    })
}

fn cluster_stream<'a>(
    stream: &[&'a CharRecord],
    tolerance: f64,
    config: &LayoutConfig,
) -> Vec<Vec<CharRecord>> {
    let mut sorted: Vec<&'a CharRecord> = stream.to_vec();
    sorted.sort_by(|a, b| {
        a.bbox
            .mid_y()
            .total_cmp(&b.bbox.mid_y())
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
            .then(a.id.index.cmp(&b.id.index))
    });

    let mut clusters: Vec<Cluster<'a>> = Vec::new();
    for c in sorted {
        let joined = match clusters.last_mut() {
            Some(last) => {
                let tol = if config.enable_formula_protect
                    && last.is_formula_dense(config.formula_density_ratio)
                {
                    tolerance * config.formula_tolerance_ratio
                } else {
                    tolerance
                };
                if (c.bbox.mid_y() - last.center()).abs() <= tol {
                    last.push(c);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if !joined {
            clusters.push(Cluster::new(c));
        }
    }

    let clusters = attach_raised_clusters(clusters);

    let mut lines: Vec<Vec<CharRecord>> = clusters
        .into_iter()
        .filter(|cl| cl.printable().next().is_some())
        .map(|cl| {
            let mut chars: Vec<CharRecord> = cl.chars.into_iter().cloned().collect();
            chars.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0).then(a.id.index.cmp(&b.id.index)));
            chars
        })
        .collect();
    lines.sort_by(|a, b| line_center(a).total_cmp(&line_center(b)));
    lines
}

fn line_center(chars: &[CharRecord]) -> f64 {
    chars.iter().map(|c| c.bbox.mid_y()).sum::<f64>() / chars.len().max(1) as f64
}

/// Merge small-font clusters (superscript/subscript markers) into the
/// neighboring line they sit on. Very short clusters in the neighbor's own
/// size also attach, which catches raised markers split off by a tolerance
/// that smaller text elsewhere on the page has narrowed.
fn attach_raised_clusters(clusters: Vec<Cluster<'_>>) -> Vec<Cluster<'_>> {
    let mut slots: Vec<Option<Cluster<'_>>> = clusters.into_iter().map(Some).collect();

    for i in 0..slots.len() {
        let Some(candidate) = slots[i].as_ref() else {
            continue;
        };
        let count = candidate.printable().count();
        if count == 0 || count > MAX_ATTACH_CHARS {
            continue;
        }
        let size = candidate.size();
        let size_ratio = if count <= MAX_SAME_SIZE_ATTACH_CHARS {
            1.0
        } else {
            ATTACH_SIZE_RATIO
        };
        let center = candidate.center();
        let (lo, hi) = candidate.x_extent();

        let target = slots
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .filter_map(|(j, s)| s.as_ref().map(|s| (j, s)))
            .filter(|(_, n)| {
                let n_size = n.size();
                let (n_lo, n_hi) = n.x_extent();
                let slack = n_size * ATTACH_GAP_RATIO;
                n.printable().count() > count
                    && size <= n_size * size_ratio
                    && (center - n.center()).abs() <= n_size * ATTACH_CENTER_RATIO
                    && lo <= n_hi + slack
                    && hi >= n_lo - slack
            })
            .min_by(|(_, a), (_, b)| {
                (center - a.center()).abs().total_cmp(&(center - b.center()).abs())
            })
            .map(|(j, _)| j);

        if let Some(j) = target
            && let Some(taken) = slots[i].take()
            && let Some(neighbor) = slots[j].as_mut()
        {
            neighbor.absorb(taken);
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use citemark_core::{BBox, CharId, Rgb};

    fn ch(index: usize, text: &str, x0: f64, top: f64, size: f64) -> CharRecord {
        CharRecord {
            id: CharId { page: 1, index },
            text: text.into(),
            bbox: BBox::new(x0, x0 + size * 0.5, top, top + size),
            fontname: Some("Times-Roman".into()),
            size,
            color: Rgb::default(),
            bold: false,
            italic: false,
            upright: true,
        }
    }

    fn page(chars: Vec<CharRecord>) -> PageChars {
        PageChars {
            number: 1,
            width: 612.0,
            height: 792.0,
            chars,
        }
    }

    fn texts(layout: &PageLayout) -> Vec<String> {
        layout.lines.iter().map(|l| l.raw_text()).collect()
    }

    #[test]
    fn test_orders_lines_top_to_bottom_and_chars_left_to_right() {
        let chars = vec![
            ch(0, "d", 80.0, 120.0, 10.0),
            ch(1, "a", 70.0, 100.0, 10.0),
            ch(2, "c", 70.0, 120.0, 10.0),
            ch(3, "b", 75.0, 100.0, 10.0),
        ];
        let layout = reconstruct_lines(&page(chars), &LayoutConfig::default());
        assert_eq!(texts(&layout), vec!["ab", "cd"]);
        assert_eq!(layout.lines[1].index, 1);
    }

    #[test]
    fn test_ties_broken_by_extraction_order() {
        let chars = vec![ch(5, "y", 70.0, 100.0, 10.0), ch(2, "x", 70.0, 100.0, 10.0)];
        let layout = reconstruct_lines(&page(chars), &LayoutConfig::default());
        assert_eq!(texts(&layout), vec!["xy"]);
    }

    #[test]
    fn test_whitespace_only_line_dropped() {
        let chars = vec![ch(0, " ", 70.0, 100.0, 10.0), ch(1, "a", 70.0, 140.0, 10.0)];
        let layout = reconstruct_lines(&page(chars), &LayoutConfig::default());
        assert_eq!(texts(&layout), vec!["a"]);
    }

    #[test]
    fn test_margins_excluded() {
        let chars = vec![
            ch(0, "h", 70.0, 5.0, 10.0),
            ch(1, "a", 70.0, 300.0, 10.0),
            ch(2, "f", 70.0, 780.0, 10.0),
        ];
        let layout = reconstruct_lines(&page(chars), &LayoutConfig::default());
        assert_eq!(texts(&layout), vec!["a"]);
    }

    #[test]
    fn test_raised_marker_attaches_to_body_line() {
        let mut chars: Vec<CharRecord> = "word"
            .chars()
            .enumerate()
            .map(|(i, c)| ch(i, &c.to_string(), 70.0 + i as f64 * 5.0, 100.0, 10.0))
            .collect();
        chars.push(ch(4, "1", 90.5, 97.0, 5.0));
        chars.push(ch(5, "n", 70.0, 114.0, 10.0));
        let layout = reconstruct_lines(&page(chars), &LayoutConfig::default());
        assert_eq!(texts(&layout), vec!["word1", "n"]);
    }

    #[test]
    fn test_same_size_raised_marker_attaches_with_small_text_on_page() {
        let mut chars = Vec::new();
        for (i, c) in "Cells divide quickly".chars().enumerate() {
            chars.push(ch(chars.len(), &c.to_string(), 70.0 + i as f64 * 5.0, 100.0, 10.0));
        }
        chars.push(ch(chars.len(), "3", 170.0, 96.5, 10.0));
        for (i, c) in " under stress.".chars().enumerate() {
            chars.push(ch(chars.len(), &c.to_string(), 175.0 + i as f64 * 5.0, 100.0, 10.0));
        }
        // 6pt text narrows the clustering tolerance to 3pt, below the 3.5pt rise.
        for (i, c) in "a note".chars().enumerate() {
            chars.push(ch(chars.len(), &c.to_string(), 70.0 + i as f64 * 3.0, 400.0, 6.0));
        }
        let layout = reconstruct_lines(&page(chars), &LayoutConfig::default());
        assert_eq!(texts(&layout), vec!["Cells divide quickly3 under stress.", "a note"]);
    }

    #[test]
    fn test_same_size_short_line_apart_from_body_stays_separate() {
        let mut chars: Vec<CharRecord> = "body text"
            .chars()
            .enumerate()
            .map(|(i, c)| ch(i, &c.to_string(), 70.0 + i as f64 * 5.0, 100.0, 10.0))
            .collect();
        chars.push(ch(9, "12", 70.0, 112.0, 10.0));
        let layout = reconstruct_lines(&page(chars), &LayoutConfig::default());
        assert_eq!(texts(&layout), vec!["body text", "12"]);
    }

    #[test]
    fn test_two_column_band_is_column_major() {
        let mut chars = Vec::new();
        for row in 0..3 {
            let top = 300.0 + row as f64 * 14.0;
            for i in 0..8 {
                chars.push(ch(chars.len(), "L", 60.0 + i as f64 * 20.0, top, 10.0));
            }
            for i in 0..8 {
                chars.push(ch(chars.len(), "R", 330.0 + i as f64 * 20.0, top, 10.0));
            }
        }
        let config = LayoutConfig {
            region_splits: vec![],
            ..LayoutConfig::default()
        };
        let layout = reconstruct_lines(&page(chars.clone()), &config);
        let t = texts(&layout);
        assert_eq!(t.len(), 6);
        assert!(t[..3].iter().all(|s| s == "LLLLLLLL"));
        assert!(t[3..].iter().all(|s| s == "RRRRRRRR"));
        assert_eq!(layout.lines[4].column, 1);

        let single = LayoutConfig {
            enable_two_column_detect: false,
            ..config.clone()
        };
        let merged = reconstruct_lines(&page(chars.clone()), &single);
        assert_eq!(texts(&merged)[0], "LLLLLLLLRRRRRRRR");

        assert_eq!(reconstruct_lines(&page(chars), &config), layout);
    }

    #[test]
    fn test_every_line_sorted_and_single_page() {
        let chars: Vec<CharRecord> = (0..40)
            .map(|i| ch(i, "z", 500.0 - (i % 10) as f64 * 30.0, 100.0 + (i / 10) as f64 * 15.0, 10.0))
            .collect();
        let layout = reconstruct_lines(&page(chars), &LayoutConfig::default());
        for line in &layout.lines {
            assert!(line.chars.windows(2).all(|w| w[0].bbox.x0 <= w[1].bbox.x0));
            assert!(line.chars.iter().all(|c| c.page() == 1));
        }
    }

    #[test]
    fn test_formula_protect_keeps_tall_math_on_one_line() {
        let mut chars = Vec::new();
        for (i, (text, top)) in [("x", 100.0), ("=", 101.0), ("y", 100.0), ("+", 101.0), ("∑", 109.0)]
            .iter()
            .enumerate()
        {
            let mut c = ch(i, text, 70.0 + i as f64 * 6.0, *top, 10.0);
            c.italic = *text == "x" || *text == "y";
            chars.push(c);
        }
        let protected = reconstruct_lines(&page(chars.clone()), &LayoutConfig::default());
        assert_eq!(protected.lines.len(), 1);

        let plain = LayoutConfig {
            enable_formula_protect: false,
            ..LayoutConfig::default()
        };
        assert_eq!(reconstruct_lines(&page(chars), &plain).lines.len(), 2);
    }
}
