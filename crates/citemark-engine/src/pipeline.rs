//! Per-document pipeline: adapter, line reconstruction, running line
//! suppression, bibliography, both citation channels and fusion.

use std::sync::atomic::{AtomicBool, Ordering};

use citemark_core::{
    AnalysisConfig, Bibliography, LineRecord, Occurrence, RawPage, SuperscriptToken, TextSpan,
    adapt_page,
};
use citemark_layout::{
    PageLayout, aggregate_spans, detect_superscripts, page_tokens, reconstruct_lines,
    superscript_candidates, suppress_running_lines,
};
use citemark_parsing::{bracket_candidates, parse_bibliography};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::fusion::{FusionStats, fuse_page};

/// Cooperative cancellation, polled between pages.
pub trait Cancellation: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Progress notifications emitted while a document is analyzed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    PageReconstructed {
        page: usize,
        total: usize,
    },
    BibliographyParsed {
        entries: usize,
        max_id: u32,
        reliable: bool,
    },
    PageAnalyzed {
        page: usize,
        total: usize,
        occurrences: usize,
    },
}

/// Whether every page was analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Completeness {
    Complete,
    /// Cancelled; only the first `pages_analyzed` pages carry results.
    Partial { pages_analyzed: usize },
}

/// Results for one page. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageAnalysis {
    /// 1-based page number.
    pub number: usize,
    pub width: f64,
    pub height: f64,
    pub lines: Vec<LineRecord>,
    pub spans: Vec<TextSpan>,
    pub tokens: Vec<SuperscriptToken>,
    pub occurrences: Vec<Occurrence>,
    pub stats: FusionStats,
}

/// Results for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentAnalysis {
    /// Pages in the source document.
    pub page_count: usize,
    pub pages: Vec<PageAnalysis>,
    pub bibliography: Bibliography,
    /// Fusion counters summed over analyzed pages.
    pub stats: FusionStats,
    pub running_lines_removed: usize,
    pub completeness: Completeness,
}

impl DocumentAnalysis {
    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }

    /// Every occurrence in document order.
    pub fn occurrences(&self) -> impl Iterator<Item = &Occurrence> {
        self.pages.iter().flat_map(|p| p.occurrences.iter())
    }
}

/// Pipeline bound to one resolved configuration. Holds no per-document
/// state, so one analyzer can process any number of documents in turn.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Reading-order lines for every page, running headers and footers
    /// removed. Returns `None` when cancelled.
    pub fn reconstruct(
        &self,
        pages: &[RawPage],
        cancel: &dyn Cancellation,
        progress: &impl Fn(ProgressEvent),
    ) -> Option<(Vec<PageLayout>, usize)> {
        let total = pages.len();
        let mut layouts = Vec::with_capacity(total);
        for (i, raw) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(page = i + 1, "cancelled during line reconstruction");
                return None;
            }
            let chars = adapt_page(i + 1, raw);
            layouts.push(reconstruct_lines(&chars, &self.config.layout));
            progress(ProgressEvent::PageReconstructed { page: i + 1, total });
        }
        let removed = suppress_running_lines(&mut layouts, &self.config.layout.running);
        Some((layouts, removed))
    }

    /// Analyze one document's pages.
    ///
    /// Cancellation is checked before each page; a cancelled run returns the
    /// pages finished so far, marked [`Completeness::Partial`].
    pub fn analyze(
        &self,
        pages: &[RawPage],
        cancel: &dyn Cancellation,
        progress: impl Fn(ProgressEvent),
    ) -> DocumentAnalysis {
        let total = pages.len();
        let Some((layouts, running_lines_removed)) = self.reconstruct(pages, cancel, &progress) else {
            return DocumentAnalysis {
                page_count: total,
                pages: Vec::new(),
                bibliography: Bibliography::default(),
                stats: FusionStats::default(),
                running_lines_removed: 0,
                completeness: Completeness::Partial { pages_analyzed: 0 },
            };
        };

        let config = &self.config;
        let bibliography = parse_bibliography(&layouts, &config.bibliography, &config.layout);
        progress(ProgressEvent::BibliographyParsed {
            entries: bibliography.len(),
            max_id: bibliography.max_id(),
            reliable: bibliography.is_reliable(config.fusion.min_bib_entries),
        });

        let mut analyzed = Vec::with_capacity(total);
        let mut stats = FusionStats::default();
        let mut completeness = Completeness::Complete;
        for layout in layouts {
            if cancel.is_cancelled() {
                completeness = Completeness::Partial {
                    pages_analyzed: analyzed.len(),
                };
                break;
            }
            let page = self.analyze_page(layout, &bibliography);
            stats += page.stats;
            progress(ProgressEvent::PageAnalyzed {
                page: page.number,
                total,
                occurrences: page.occurrences.len(),
            });
            analyzed.push(page);
        }

        tracing::info!(
            pages = analyzed.len(),
            total,
            occurrences = analyzed.iter().map(|p| p.occurrences.len()).sum::<usize>(),
            bib_entries = bibliography.len(),
            complete = completeness == Completeness::Complete,
            "document analyzed"
        );
        DocumentAnalysis {
            page_count: total,
            pages: analyzed,
            bibliography,
            stats,
            running_lines_removed,
            completeness,
        }
    }

    fn analyze_page(&self, layout: PageLayout, bibliography: &Bibliography) -> PageAnalysis {
        let config = &self.config;
        let PageLayout {
            number,
            width,
            height,
            lines,
        } = layout;

        let detection = detect_superscripts(&lines, &config.superscript);
        // Reference list lines are fed to neither channel.
        let body_lines: Vec<LineRecord> = lines
            .iter()
            .filter(|l| !bibliography.covers_line(l.page, l.index))
            .cloned()
            .collect();
        let tokens = page_tokens(&body_lines, &detection.flags, &detection.metrics, &config.superscript);

        let mut candidates = superscript_candidates(&tokens, &body_lines, &config.layout);
        candidates.extend(bracket_candidates(&body_lines, bibliography, &config.layout));
        let (occurrences, stats) = fuse_page(candidates, bibliography, &config.fusion);
        tracing::debug!(
            page = number,
            tokens = tokens.len(),
            candidates = stats.candidates,
            occurrences = occurrences.len(),
            "page analyzed"
        );

        let spans = lines.iter().flat_map(|l| aggregate_spans(l, &config.layout)).collect();
        PageAnalysis {
            number,
            width,
            height,
            lines,
            spans,
            tokens,
            occurrences,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citemark_core::RawChar;

    fn raw_page(rows: &[&str]) -> RawPage {
        let chars = rows
            .iter()
            .enumerate()
            .flat_map(|(r, text)| {
                let top = 200.0 + r as f64 * 14.0;
                text.chars().enumerate().map(move |(i, c)| RawChar {
                    text: c.to_string(),
                    x0: 72.0 + i as f64 * 5.0,
                    x1: 77.0 + i as f64 * 5.0,
                    top,
                    bottom: top + 10.0,
                    fontname: Some("Times-Roman".into()),
                    size: Some(10.0),
                    color: None,
                    upright: true,
                })
            })
            .collect();
        RawPage {
            width: 612.0,
            height: 792.0,
            chars,
        }
    }

    #[test]
    fn test_never_cancel_and_flags() {
        assert!(!NeverCancel.is_cancelled());
        let flag = AtomicBool::new(false);
        assert!(!Cancellation::is_cancelled(&flag));
        flag.store(true, Ordering::Relaxed);
        assert!(Cancellation::is_cancelled(&flag));
        let token = CancellationToken::new();
        token.cancel();
        assert!(Cancellation::is_cancelled(&token));
    }

    #[test]
    fn test_empty_page_degrades_gracefully() {
        let analysis = Analyzer::default().analyze(&[RawPage::default()], &NeverCancel, |_| {});
        assert!(analysis.is_complete());
        assert_eq!(analysis.pages.len(), 1);
        assert!(analysis.pages[0].lines.is_empty());
        assert!(analysis.bibliography.is_empty());

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["completeness"]["status"], "complete");
        assert_eq!(json["page_count"], 1);
    }

    #[test]
    fn test_cancelled_before_start_is_partial() {
        let analysis = Analyzer::default().analyze(&[raw_page(&["text [1]"])], &AtomicBool::new(true), |_| {});
        assert_eq!(analysis.completeness, Completeness::Partial { pages_analyzed: 0 });
        assert_eq!(analysis.occurrences().count(), 0);
    }

    #[test]
    fn test_bracket_citation_end_to_end() {
        let pages = [raw_page(&["Earlier work [2] showed this."])];
        let analysis = Analyzer::default().analyze(&pages, &NeverCancel, |_| {});
        let occ: Vec<&Occurrence> = analysis.occurrences().collect();
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].cited_id, 2);
        assert_eq!(occ[0].anchor_left, "Earlier work");
        assert!(!analysis.pages[0].spans.is_empty());
    }

    #[test]
    fn test_progress_events_in_order() {
        let events = std::cell::RefCell::new(Vec::new());
        let pages = [raw_page(&["one"]), raw_page(&["two"])];
        Analyzer::default().analyze(&pages, &NeverCancel, |e| events.borrow_mut().push(e));
        let events = events.into_inner();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], ProgressEvent::PageReconstructed { page: 1, total: 2 });
        assert!(matches!(events[2], ProgressEvent::BibliographyParsed { entries: 0, .. }));
        assert!(matches!(events[4], ProgressEvent::PageAnalyzed { page: 2, total: 2, .. }));
    }
}
