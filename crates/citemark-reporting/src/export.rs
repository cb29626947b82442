use std::io::Write;
use std::path::Path;

use citemark_core::{Channel, Occurrence};
use citemark_engine::{
    Completeness, DocumentAnalysis, FusionStats, ReferenceUsage, summarize_references,
};
use serde::Serialize;

use crate::ExportFormat;

/// Export the citation occurrences of one analyzed document to `path`.
pub fn export_occurrences(
    analysis: &DocumentAnalysis,
    format: ExportFormat,
    path: &Path,
) -> Result<(), String> {
    let content = render(analysis, format)?;

    let mut file =
        std::fs::File::create(path).map_err(|e| format!("Failed to create file: {}", e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write: {}", e))?;
    tracing::debug!(
        path = %path.display(),
        format = format.label(),
        occurrences = analysis.occurrences().count(),
        "exported occurrences"
    );
    Ok(())
}

/// Render the export document without writing it anywhere.
pub fn render(analysis: &DocumentAnalysis, format: ExportFormat) -> Result<String, String> {
    match format {
        ExportFormat::Csv => Ok(export_csv(analysis)),
        ExportFormat::Json => export_json(analysis),
        ExportFormat::Text => Ok(export_text(analysis)),
    }
}

fn channels_str(channels: &[Channel]) -> String {
    channels
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("+")
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(analysis: &DocumentAnalysis) -> String {
    let mut out = String::from("ref_id,page,line,confidence,linked,channels,anchor\n");
    for o in analysis.occurrences() {
        out.push_str(&format!(
            "{},{},{},{:.2},{},{},{}\n",
            o.cited_id,
            o.page,
            o.line,
            o.confidence,
            o.is_linked(),
            channels_str(&o.channels),
            csv_escape(&o.anchor_left),
        ));
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    page_count: usize,
    pages_analyzed: usize,
    completeness: Completeness,
    bibliography_entries: usize,
    max_id: u32,
    running_lines_removed: usize,
    stats: FusionStats,
    occurrences: Vec<&'a Occurrence>,
    references: Vec<ReferenceUsage>,
}

fn export_json(analysis: &DocumentAnalysis) -> Result<String, String> {
    let report = JsonReport {
        page_count: analysis.page_count,
        pages_analyzed: analysis.pages.len(),
        completeness: analysis.completeness,
        bibliography_entries: analysis.bibliography.len(),
        max_id: analysis.bibliography.max_id(),
        running_lines_removed: analysis.running_lines_removed,
        stats: analysis.stats,
        occurrences: analysis.occurrences().collect(),
        references: summarize_references(analysis),
    };
    serde_json::to_string_pretty(&report).map_err(|e| format!("Failed to serialize: {}", e))
}

fn export_text(analysis: &DocumentAnalysis) -> String {
    let mut out = String::from("Citemark Results\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');

    let total = analysis.occurrences().count();
    let linked = analysis.occurrences().filter(|o| o.is_linked()).count();
    let corroborated = analysis.occurrences().filter(|o| o.is_corroborated()).count();
    let status = match analysis.completeness {
        Completeness::Complete => String::new(),
        Completeness::Partial { pages_analyzed } => {
            format!(" [ABORTED after {} of {} pages]", pages_analyzed, analysis.page_count)
        }
    };
    out.push_str(&format!(
        "  {} pages{} | {} bibliography entries (max ID {})\n",
        analysis.page_count,
        status,
        analysis.bibliography.len(),
        analysis.bibliography.max_id(),
    ));
    out.push_str(&format!(
        "  {} occurrences | {} linked | {} unlinked | {} corroborated\n",
        total,
        linked,
        total - linked,
        corroborated,
    ));

    for page in analysis.pages.iter().filter(|p| !p.occurrences.is_empty()) {
        let title = format!("Page {}", page.number);
        out.push_str(&format!("\n{}\n", title));
        out.push_str(&"-".repeat(title.len()));
        out.push('\n');
        for o in &page.occurrences {
            let link = if o.is_linked() { "" } else { " [UNLINKED]" };
            out.push_str(&format!(
                "  [{}] line {} - {:.2} ({}){}\n",
                o.cited_id,
                o.line,
                o.confidence,
                channels_str(&o.channels),
                link,
            ));
            if !o.anchor_left.is_empty() {
                out.push_str(&format!("       ...{}\n", o.anchor_left));
            }
        }
    }

    let uncited: Vec<String> = summarize_references(analysis)
        .iter()
        .filter(|u| u.occurrences == 0)
        .map(|u| u.id.to_string())
        .collect();
    if !uncited.is_empty() {
        out.push_str(&format!("\nNever cited: {}\n", uncited.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use citemark_core::{BBox, Bibliography, RefEntry};
    use citemark_engine::PageAnalysis;

    fn occ(id: u32, page: usize, line: usize, channels: Vec<Channel>, linked: bool) -> Occurrence {
        Occurrence {
            cited_id: id,
            entry_id: linked.then_some(id),
            page,
            line,
            bbox: BBox::new(100.0, 110.0, 200.0, 210.0),
            confidence: 0.9,
            channels,
            raw: format!("[{id}]"),
            anchor_left: "as shown by Smith, Jones".into(),
        }
    }

    fn page(number: usize, occurrences: Vec<Occurrence>) -> PageAnalysis {
        PageAnalysis {
            number,
            width: 612.0,
            height: 792.0,
            lines: Vec::new(),
            spans: Vec::new(),
            tokens: Vec::new(),
            occurrences,
            stats: FusionStats::default(),
        }
    }

    fn analysis(completeness: Completeness) -> DocumentAnalysis {
        let bibliography = Bibliography::new(
            (1..=3)
                .map(|id| RefEntry {
                    id,
                    text: format!("Author {id}. Title."),
                    page: 3,
                    line: id as usize,
                    bracketed: true,
                })
                .collect(),
            None,
        );
        DocumentAnalysis {
            page_count: 3,
            pages: vec![
                page(
                    1,
                    vec![
                        occ(1, 1, 4, vec![Channel::Bracket], true),
                        occ(8, 1, 6, vec![Channel::Superscript, Channel::Bracket], false),
                    ],
                ),
                page(2, Vec::new()),
            ],
            bibliography,
            stats: FusionStats {
                candidates: 2,
                ..FusionStats::default()
            },
            running_lines_removed: 0,
            completeness,
        }
    }

    #[test]
    fn test_csv_escape_quotes() {
        assert_eq!(csv_escape(r#"He said "hi""#), r#""He said ""hi""""#);
    }

    #[test]
    fn test_csv_escape_clean() {
        assert_eq!(csv_escape("hello"), "hello");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
    }

    #[test]
    fn test_csv_rows() {
        let csv = export_csv(&analysis(Completeness::Complete));
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows[0], "ref_id,page,line,confidence,linked,channels,anchor");
        assert_eq!(rows[1], "1,1,4,0.90,true,bracket,\"as shown by Smith, Jones\"");
        assert_eq!(
            rows[2],
            "8,1,6,0.90,false,superscript+bracket,\"as shown by Smith, Jones\""
        );
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_json_report() {
        let json = export_json(&analysis(Completeness::Partial { pages_analyzed: 2 })).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["completeness"]["status"], "partial");
        assert_eq!(value["completeness"]["pages_analyzed"], 2);
        assert_eq!(value["bibliography_entries"], 3);
        assert_eq!(value["occurrences"].as_array().unwrap().len(), 2);
        assert_eq!(value["occurrences"][1]["channels"][0], "superscript");
        assert_eq!(value["references"].as_array().unwrap().len(), 4);
        assert_eq!(value["stats"]["candidates"], 2);
    }

    #[test]
    fn test_text_report() {
        let text = export_text(&analysis(Completeness::Complete));
        assert!(text.starts_with("Citemark Results\n"));
        assert!(text.contains("2 occurrences | 1 linked | 1 unlinked | 1 corroborated"));
        assert!(text.contains("Page 1\n------\n"));
        assert!(!text.contains("Page 2"));
        assert!(text.contains("[8] line 6 - 0.90 (superscript+bracket) [UNLINKED]"));
        assert!(text.contains("Never cited: 2, 3"));
        assert!(!text.contains("ABORTED"));
    }

    #[test]
    fn test_text_report_marks_aborted_run() {
        let text = export_text(&analysis(Completeness::Partial { pages_analyzed: 2 }));
        assert!(text.contains("[ABORTED after 2 of 3 pages]"));
    }

    #[test]
    fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citations.csv");
        export_occurrences(&analysis(Completeness::Complete), ExportFormat::Csv, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 3);
    }

    #[test]
    fn test_export_to_missing_dir_fails() {
        let err = export_occurrences(
            &analysis(Completeness::Complete),
            ExportFormat::Text,
            Path::new("/nonexistent/dir/out.txt"),
        )
        .unwrap_err();
        assert!(err.starts_with("Failed to create file"));
    }
}
