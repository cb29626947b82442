//! Vertical bands and column gutters.

use citemark_core::CharRecord;

/// Each side of a gutter must hold at least this share of the band's characters.
const MIN_COLUMN_SHARE: f64 = 0.15;

/// Bands with fewer printable characters are never split.
const MIN_BAND_CHARS: usize = 20;

/// Gutter centers must fall in this fraction of the page width.
const GUTTER_CENTER_RANGE: (f64, f64) = (0.3, 0.7);

/// Bound snapping gives up after this many passes.
const MAX_SNAP_PASSES: usize = 16;

/// Compute the y boundaries between bands for a page.
///
/// Each split is a fraction of `height`. A boundary that would cut through a
/// character box is moved down to that character's bottom edge, repeatedly,
/// so no line straddles two bands. The result is non-decreasing.
pub fn band_boundaries(chars: &[&CharRecord], height: f64, splits: &[f64]) -> Vec<f64> {
    let mut bounds = Vec::with_capacity(splits.len());
    let mut floor = f64::NEG_INFINITY;
    for split in splits {
        let mut y = (split * height).max(floor);
        for _ in 0..MAX_SNAP_PASSES {
            let cut = chars
                .iter()
                .filter(|c| c.bbox.top < y && y < c.bbox.bottom)
                .map(|c| c.bbox.bottom)
                .fold(f64::NEG_INFINITY, f64::max);
            if cut.is_finite() {
                y = cut;
            } else {
                break;
            }
        }
        floor = y;
        bounds.push(y);
    }
    bounds
}

/// Index of the band a character belongs to, by vertical mid-point.
pub fn band_of(c: &CharRecord, bounds: &[f64]) -> usize {
    let mid = c.bbox.mid_y();
    bounds.iter().take_while(|b| mid >= **b).count()
}

/// Search a band for a vertical whitespace gutter.
///
/// Returns the gutter's x center when the widest uncovered horizontal gap is
/// at least `min_gutter_ratio * page_width` wide, centered in the middle of
/// the page, with enough text on both sides.
pub fn find_gutter(chars: &[&CharRecord], page_width: f64, min_gutter_ratio: f64) -> Option<f64> {
    let mut intervals: Vec<(f64, f64)> = chars
        .iter()
        .filter(|c| !c.is_whitespace())
        .map(|c| (c.bbox.x0, c.bbox.x1))
        .collect();
    if intervals.len() < MIN_BAND_CHARS || page_width <= 0.0 {
        return None;
    }
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f64, f64)> = Vec::new();
    for (x0, x1) in intervals.iter().copied() {
        match merged.last_mut() {
            Some(last) if x0 <= last.1 => last.1 = last.1.max(x1),
            _ => merged.push((x0, x1)),
        }
    }

    let min_width = min_gutter_ratio * page_width;
    let (lo, hi) = (
        GUTTER_CENTER_RANGE.0 * page_width,
        GUTTER_CENTER_RANGE.1 * page_width,
    );
    let total = intervals.len() as f64;

    merged
        .windows(2)
        .map(|w| (w[0].1, w[1].0))
        .filter(|(left, right)| right - left >= min_width)
        .map(|(left, right)| (left, right, (left + right) / 2.0))
        .filter(|(_, _, center)| (lo..=hi).contains(center))
        .filter(|(_, _, center)| {
            let left_count = intervals.iter().filter(|(x0, _)| x0 < center).count() as f64;
            let share = left_count / total;
            share >= MIN_COLUMN_SHARE && 1.0 - share >= MIN_COLUMN_SHARE
        })
        .max_by(|a, b| (a.1 - a.0).total_cmp(&(b.1 - b.0)))
        .map(|(_, _, center)| center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use citemark_core::{BBox, CharId, Rgb};

    fn ch(index: usize, x0: f64, top: f64) -> CharRecord {
        CharRecord {
            id: CharId { page: 1, index },
            text: "x".into(),
            bbox: BBox::new(x0, x0 + 5.0, top, top + 10.0),
            fontname: Some("Times".into()),
            size: 10.0,
            color: Rgb::default(),
            bold: false,
            italic: false,
            upright: true,
        }
    }

    fn two_columns() -> Vec<CharRecord> {
        let mut chars = Vec::new();
        for row in 0..5 {
            let top = 100.0 + row as f64 * 12.0;
            for i in 0..10 {
                chars.push(ch(chars.len(), 60.0 + i as f64 * 20.0, top));
                chars.push(ch(chars.len(), 330.0 + i as f64 * 20.0, top));
            }
        }
        chars
    }

    #[test]
    fn test_gutter_found_between_columns() {
        let chars = two_columns();
        let refs: Vec<&CharRecord> = chars.iter().collect();
        let gutter = find_gutter(&refs, 612.0, 0.03).unwrap();
        assert!(gutter > 245.0 && gutter < 330.0, "gutter at {gutter}");
    }

    #[test]
    fn test_no_gutter_for_single_column() {
        let chars: Vec<CharRecord> = (0..60).map(|i| ch(i, 60.0 + (i % 30) as f64 * 16.0, 100.0)).collect();
        let refs: Vec<&CharRecord> = chars.iter().collect();
        assert_eq!(find_gutter(&refs, 612.0, 0.03), None);
    }

    #[test]
    fn test_no_gutter_when_too_narrow() {
        let chars = two_columns();
        let refs: Vec<&CharRecord> = chars.iter().collect();
        assert_eq!(find_gutter(&refs, 612.0, 0.2), None);
    }

    #[test]
    fn test_band_boundary_snaps_below_cut_chars() {
        let chars = vec![ch(0, 10.0, 95.0), ch(1, 20.0, 100.0)];
        let refs: Vec<&CharRecord> = chars.iter().collect();
        // 0.5 * 200 = 100 cuts the first box, then the second.
        let bounds = band_boundaries(&refs, 200.0, &[0.5]);
        assert_eq!(bounds, vec![110.0]);
        assert_eq!(band_of(&chars[0], &bounds), 0);
        assert_eq!(band_of(&chars[1], &bounds), 0);
    }

    #[test]
    fn test_band_boundaries_stay_ordered() {
        let chars = vec![ch(0, 10.0, 95.0)];
        let bounds = band_boundaries(&[&chars[0]], 200.0, &[0.5, 0.51]);
        assert_eq!(bounds, vec![105.0, 105.0]);
    }
}
