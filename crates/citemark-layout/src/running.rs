//! Running header/footer suppression across a document.

use citemark_core::{LineRecord, RunningHeaderConfig};

use crate::lines::PageLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Top,
    Bottom,
}

struct Candidate {
    page: usize,
    line: usize,
    zone: Zone,
    top: f64,
    size: f64,
    key: String,
}

/// Lowercased text with digits masked and whitespace removed, so page
/// numbers and spacing differences do not break matches.
fn line_key(line: &LineRecord) -> String {
    line.raw_text()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c.is_ascii_digit() { '#' } else { c.to_ascii_lowercase() })
        .collect()
}

fn zone_of(line: &LineRecord, height: f64, zone_ratio: f64) -> Option<Zone> {
    let bbox = line.bbox();
    if bbox.bottom <= height * zone_ratio {
        Some(Zone::Top)
    } else if bbox.top >= height * (1.0 - zone_ratio) {
        Some(Zone::Bottom)
    } else {
        None
    }
}

/// Remove lines that repeat in the top or bottom zone of at least
/// `min_pages` pages at a similar position, size and text. Returns the
/// number of lines removed.
pub fn suppress_running_lines(pages: &mut [PageLayout], config: &RunningHeaderConfig) -> usize {
    if !config.enabled || pages.len() < config.min_pages {
        return 0;
    }

    let candidates: Vec<Candidate> = pages
        .iter()
        .enumerate()
        .flat_map(|(p, page)| {
            page.lines.iter().enumerate().filter_map(move |(l, line)| {
                let zone = zone_of(line, page.height, config.zone_ratio)?;
                let key = line_key(line);
                if key.is_empty() {
                    return None;
                }
                Some(Candidate {
                    page: p,
                    line: l,
                    zone,
                    top: line.bbox().top,
                    size: line.body_size(),
                    key,
                })
            })
        })
        .collect();

    let mut doomed: Vec<(usize, usize)> = Vec::new();
    for c in &candidates {
        let mut matched_pages: Vec<usize> = candidates
            .iter()
            .filter(|o| o.page != c.page && o.zone == c.zone)
            .filter(|o| (o.top - c.top).abs() <= config.position_tolerance)
            .filter(|o| (o.size - c.size).abs() <= config.font_tolerance)
            .filter(|o| rapidfuzz::fuzz::ratio(c.key.chars(), o.key.chars()) >= config.similarity)
            .map(|o| o.page)
            .collect();
        matched_pages.sort_unstable();
        matched_pages.dedup();
        if matched_pages.len() + 1 >= config.min_pages {
            doomed.push((c.page, c.line));
        }
    }

    for (p, page) in pages.iter_mut().enumerate() {
        let mut l = 0;
        page.lines.retain(|_| {
            let keep = !doomed.contains(&(p, l));
            l += 1;
            keep
        });
        page.reindex();
    }

    if !doomed.is_empty() {
        tracing::debug!(removed = doomed.len(), "suppressed running headers/footers");
    }
    doomed.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use citemark_core::{BBox, CharId, CharRecord, Rgb};

    fn line(page: usize, text: &str, top: f64) -> LineRecord {
        let chars = text
            .chars()
            .enumerate()
            .map(|(i, c)| CharRecord {
                id: CharId { page, index: i },
                text: c.to_string(),
                bbox: BBox::new(100.0 + i as f64 * 5.0, 105.0 + i as f64 * 5.0, top, top + 9.0),
                fontname: Some("Times".into()),
                size: 9.0,
                color: Rgb::default(),
                bold: false,
                italic: false,
                upright: true,
            })
            .collect();
        LineRecord {
            page,
            index: 0,
            band: 0,
            column: 0,
            chars,
        }
    }

    fn page(number: usize, lines: Vec<LineRecord>) -> PageLayout {
        let mut p = PageLayout {
            number,
            width: 612.0,
            height: 792.0,
            lines,
        };
        p.reindex();
        p
    }

    fn doc() -> Vec<PageLayout> {
        (1..=4)
            .map(|n| {
                page(
                    n,
                    vec![
                        line(n, "Journal of Examples, Vol. 12", 40.0 + n as f64),
                        line(n, &format!("Body text number {n}"), 300.0),
                        line(n, &format!("Page {n}"), 760.0),
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn test_repeated_header_and_footer_removed() {
        let mut pages = doc();
        let removed = suppress_running_lines(&mut pages, &RunningHeaderConfig::default());
        assert_eq!(removed, 8);
        for p in &pages {
            assert_eq!(p.lines.len(), 1);
            assert!(p.lines[0].raw_text().starts_with("Body"));
            assert_eq!(p.lines[0].index, 0);
        }
    }

    #[test]
    fn test_disabled_or_too_few_pages() {
        let mut pages = doc();
        let disabled = RunningHeaderConfig {
            enabled: false,
            ..RunningHeaderConfig::default()
        };
        assert_eq!(suppress_running_lines(&mut pages, &disabled), 0);

        let mut two = doc();
        two.truncate(2);
        assert_eq!(suppress_running_lines(&mut two, &RunningHeaderConfig::default()), 0);
    }

    #[test]
    fn test_position_drift_breaks_match() {
        let mut pages: Vec<PageLayout> = (1..=3)
            .map(|n| page(n, vec![line(n, "Running title", 20.0 + n as f64 * 20.0)]))
            .collect();
        assert_eq!(suppress_running_lines(&mut pages, &RunningHeaderConfig::default()), 0);
    }
}
