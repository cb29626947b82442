//! Per-reference usage, the data behind a reference panel.

use std::collections::BTreeMap;

use citemark_core::Channel;
use serde::Serialize;

use crate::pipeline::DocumentAnalysis;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceUsage {
    pub id: u32,
    /// Number of occurrences in analyzed pages.
    pub occurrences: usize,
    /// Distinct pages citing the reference, ascending.
    pub pages: Vec<usize>,
    pub channels: Vec<Channel>,
    pub best_confidence: f64,
    /// Whether the ID resolves to a bibliography entry.
    pub linked: bool,
    pub entry_text: Option<String>,
}

impl ReferenceUsage {
    pub fn first_page(&self) -> Option<usize> {
        self.pages.first().copied()
    }
}

/// Summarize citations per reference ID, ascending by ID.
///
/// Bibliography entries that are never cited are listed with zero
/// occurrences so the whole reference list is visible.
pub fn summarize_references(analysis: &DocumentAnalysis) -> Vec<ReferenceUsage> {
    let bib = &analysis.bibliography;
    let mut usage: BTreeMap<u32, ReferenceUsage> = bib
        .entries()
        .iter()
        .map(|e| {
            (
                e.id,
                ReferenceUsage {
                    id: e.id,
                    occurrences: 0,
                    pages: Vec::new(),
                    channels: Vec::new(),
                    best_confidence: 0.0,
                    linked: true,
                    entry_text: Some(e.text.clone()),
                },
            )
        })
        .collect();

    for o in analysis.occurrences() {
        let u = usage.entry(o.cited_id).or_insert_with(|| ReferenceUsage {
            id: o.cited_id,
            occurrences: 0,
            pages: Vec::new(),
            channels: Vec::new(),
            best_confidence: 0.0,
            linked: false,
            entry_text: None,
        });
        u.occurrences += 1;
        if !u.pages.contains(&o.page) {
            u.pages.push(o.page);
        }
        for channel in &o.channels {
            if !u.channels.contains(channel) {
                u.channels.push(*channel);
            }
        }
        u.best_confidence = u.best_confidence.max(o.confidence);
    }

    usage
        .into_values()
        .map(|mut u| {
            u.pages.sort_unstable();
            u.channels.sort_unstable();
            u
        })
        .collect()
}
