use std::io::Write;

use citemark_engine::{Completeness, DocumentAnalysis, Occurrence, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Progress bar covering both passes over the document: line
/// reconstruction, then per-page citation analysis.
pub fn progress_bar() -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    bar.set_message("Loading...");
    Ok(bar)
}

/// Advance the progress bar for one pipeline event.
pub fn advance(bar: &ProgressBar, event: &ProgressEvent) {
    match *event {
        ProgressEvent::PageReconstructed { page, total } => {
            bar.set_length(total as u64 * 2);
            bar.set_message("Reconstructing lines");
            bar.set_position(page as u64);
        }
        ProgressEvent::BibliographyParsed { entries, .. } => {
            bar.set_message(format!("Bibliography: {} entries", entries));
        }
        ProgressEvent::PageAnalyzed { page, total, .. } => {
            bar.set_message("Detecting citations");
            bar.set_position((total + page) as u64);
        }
    }
}

/// Print the document header: pages, bibliography and occurrence counts.
pub fn print_summary(
    w: &mut dyn Write,
    name: &str,
    analysis: &DocumentAnalysis,
    color: ColorMode,
) -> std::io::Result<()> {
    let total = analysis.occurrences().count();
    let linked = analysis.occurrences().filter(|o| o.is_linked()).count();
    let corroborated = analysis
        .occurrences()
        .filter(|o| o.is_corroborated())
        .count();

    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", name.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "{}", name)?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  Pages: {}", analysis.page_count)?;
    let bib = &analysis.bibliography;
    if bib.is_empty() {
        let msg = "Bibliography: not found (IDs are not bounded or linked)";
        if color.enabled() {
            writeln!(w, "  {}", msg.yellow())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    } else {
        writeln!(
            w,
            "  Bibliography: {} entries (max ID {})",
            bib.len(),
            bib.max_id()
        )?;
    }
    if analysis.running_lines_removed > 0 {
        let msg = format!(
            "Running headers/footers removed: {}",
            analysis.running_lines_removed
        );
        if color.enabled() {
            writeln!(w, "  {}", msg.dimmed())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }
    writeln!(w)?;

    if color.enabled() {
        writeln!(w, "  {} {}", "Linked:".green(), linked)?;
        writeln!(w, "  {} {}", "Unlinked:".yellow(), total - linked)?;
    } else {
        writeln!(w, "  Linked: {}", linked)?;
        writeln!(w, "  Unlinked: {}", total - linked)?;
    }
    writeln!(w, "  Corroborated by both channels: {}", corroborated)?;
    writeln!(w)?;
    Ok(())
}

fn print_occurrence(w: &mut dyn Write, o: &Occurrence, color: ColorMode) -> std::io::Result<()> {
    let channels = o
        .channels
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("+");
    let id = format!("[{}]", o.cited_id);
    if color.enabled() {
        let id = if o.is_linked() {
            id.green().to_string()
        } else {
            id.yellow().to_string()
        };
        writeln!(
            w,
            "  {} line {} {} {}",
            id,
            o.line,
            format!("{:.2}", o.confidence).bold(),
            channels.dimmed()
        )?;
    } else {
        let link = if o.is_linked() { "" } else { " (unlinked)" };
        writeln!(
            w,
            "  {} line {} {:.2} {}{}",
            id, o.line, o.confidence, channels, link
        )?;
    }
    if !o.anchor_left.is_empty() {
        writeln!(w, "      ...{}", o.anchor_left)?;
    }
    Ok(())
}

/// Print every occurrence, grouped by page.
pub fn print_occurrences(
    w: &mut dyn Write,
    analysis: &DocumentAnalysis,
    color: ColorMode,
) -> std::io::Result<()> {
    for page in analysis.pages.iter().filter(|p| !p.occurrences.is_empty()) {
        let title = format!("Page {}", page.number);
        if color.enabled() {
            writeln!(w, "{}", title.bold())?;
        } else {
            writeln!(w, "{}", title)?;
        }
        for o in &page.occurrences {
            print_occurrence(w, o, color)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Warn that the run was cancelled and the results are partial.
pub fn print_aborted(
    w: &mut dyn Write,
    analysis: &DocumentAnalysis,
    color: ColorMode,
) -> std::io::Result<()> {
    let Completeness::Partial { pages_analyzed } = analysis.completeness else {
        return Ok(());
    };
    let msg = format!(
        "Aborted: only {} of {} pages were analyzed; results are partial.",
        pages_analyzed, analysis.page_count
    );
    if color.enabled() {
        writeln!(w, "{}", msg.red().bold())?;
    } else {
        writeln!(w, "{}", msg)?;
    }
    Ok(())
}

/// Print one page of reading-order text.
pub fn print_page_text(
    w: &mut dyn Write,
    number: usize,
    text: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    let header = format!("--- Page {} ---", number);
    if color.enabled() {
        writeln!(w, "{}", header.dimmed())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    writeln!(w, "{}", text)?;
    Ok(())
}
