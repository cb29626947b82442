//! Body-text reference metrics per page region.

use citemark_core::{CharRecord, LineRecord, SuperscriptFlags, mode_size};

/// Lowercase letters without ascenders or descenders.
const X_HEIGHT_LETTERS: &str = "acemnorsuvwxz";

/// x-height as a fraction of body size when glyph boxes do not reveal it.
const DEFAULT_X_HEIGHT_RATIO: f64 = 0.5;

/// Regions with fewer printable characters borrow the page-wide metrics.
const MIN_REGION_CHARS: usize = 20;

/// Body size used when a page has no printable text at all.
const FALLBACK_BODY_SIZE: f64 = 10.0;

/// Body-text reference for one region (band) of a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionMetrics {
    pub band: usize,
    /// Most frequent size among non-flagged characters.
    pub body_size: f64,
    pub x_height: f64,
}

/// Metrics for every band of a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page: BodyMetrics,
    pub regions: Vec<RegionMetrics>,
}

/// Page-wide body size and x-height, used for sparse regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMetrics {
    pub body_size: f64,
    pub x_height: f64,
}

impl Default for BodyMetrics {
    fn default() -> Self {
        Self {
            body_size: FALLBACK_BODY_SIZE,
            x_height: FALLBACK_BODY_SIZE * DEFAULT_X_HEIGHT_RATIO,
        }
    }
}

impl PageMetrics {
    /// Metrics for `band`, falling back to page-wide values.
    pub fn region(&self, band: usize) -> RegionMetrics {
        self.regions
            .iter()
            .find(|r| r.band == band)
            .copied()
            .unwrap_or(RegionMetrics {
                band,
                body_size: self.page.body_size,
                x_height: self.page.x_height,
            })
    }
}

/// Estimate x-height from x-height letters of body size. Font-box extractors
/// report full em boxes for every glyph, in which case the measured height is
/// useless and a typographic default is used.
fn estimate_x_height(chars: &[&CharRecord], body_size: f64) -> f64 {
    let mut heights: Vec<f64> = chars
        .iter()
        .filter(|c| (c.size - body_size).abs() < 0.15 * body_size)
        .filter(|c| c.text.chars().count() == 1 && c.text.chars().all(|ch| X_HEIGHT_LETTERS.contains(ch)))
        .map(|c| c.bbox.height())
        .collect();
    if heights.is_empty() {
        return body_size * DEFAULT_X_HEIGHT_RATIO;
    }
    heights.sort_by(f64::total_cmp);
    let median = heights[heights.len() / 2];
    if median > 0.0 && median < 0.9 * body_size {
        median
    } else {
        body_size * DEFAULT_X_HEIGHT_RATIO
    }
}

fn measure(chars: &[&CharRecord]) -> Option<BodyMetrics> {
    let body_size = mode_size(chars.iter().map(|c| c.size))?;
    Some(BodyMetrics {
        body_size,
        x_height: estimate_x_height(chars, body_size),
    })
}

/// Compute per-band metrics from the page's printable characters, skipping
/// any already flagged as superscript.
pub fn page_metrics(lines: &[LineRecord], flags: &SuperscriptFlags) -> PageMetrics {
    let usable = |c: &&CharRecord| !c.is_whitespace() && !flags.is_flagged(&c.id);
    let all: Vec<&CharRecord> = lines.iter().flat_map(|l| l.chars.iter()).filter(usable).collect();
    let page = measure(&all).unwrap_or_default();

    let mut bands: Vec<usize> = lines.iter().map(|l| l.band).collect();
    bands.sort_unstable();
    bands.dedup();

    let regions = bands
        .into_iter()
        .filter_map(|band| {
            let chars: Vec<&CharRecord> = lines
                .iter()
                .filter(|l| l.band == band)
                .flat_map(|l| l.chars.iter())
                .filter(usable)
                .collect();
            if chars.len() < MIN_REGION_CHARS {
                return None;
            }
            let m = measure(&chars)?;
            Some(RegionMetrics {
                band,
                body_size: m.body_size,
                x_height: m.x_height,
            })
        })
        .collect();

    PageMetrics { page, regions }
}
