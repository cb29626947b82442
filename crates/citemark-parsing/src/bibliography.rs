//! Bibliography Parser: locates the reference list and reads entry heads.

use citemark_core::{BibRegion, Bibliography, BibliographyConfig, LayoutConfig, RefEntry};
use citemark_layout::{LineText, PageLayout};
use once_cell::sync::Lazy;
use regex::Regex;

/// Section headings that open a reference list, optionally numbered.
static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:\d+|[IVX]+)\.?\s+)?(?:references(?:\s+and\s+notes)?|bibliography|works\s+cited|literature\s+cited|参考文献)\s*$",
    )
    .unwrap()
});

/// Headings that close the reference list. "Appendix" must be bare or
/// followed by a section letter/number so titles mentioning an appendix do
/// not end the list.
static END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[A-Z]\.?\s+|\d+\.?\s+)?(?:(?i:appendix)(?:\s+[A-Z0-9]\b|\s*$)|(?i:acknowledge?ments?|supplementary(?:\s+materials?)?|(?:\w+\s+)?(?:paper\s+)?checklist)\s*$)",
    )
    .unwrap()
});

static BRACKET_HEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[(\d+)\]\s*(.*)$").unwrap());

static DOTTED_HEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)\.(?:\s+(.*))?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadStyle {
    Bracket,
    Dotted,
}

/// One reconstructed line of text with its location.
struct Row {
    page: usize,
    line: usize,
    /// Position of the page in the document, 0-based.
    position: usize,
    text: String,
}

fn is_year(id: u32) -> bool {
    (1900..=2099).contains(&id)
}

/// Match an entry head at the very start of a line. Returns the ID and the
/// remaining text. Unbracketed year-like numbers ("1998.") are not heads.
fn entry_head(text: &str, style: HeadStyle) -> Option<(u32, &str)> {
    let caps = match style {
        HeadStyle::Bracket => BRACKET_HEAD_RE.captures(text)?,
        HeadStyle::Dotted => DOTTED_HEAD_RE.captures(text)?,
    };
    let id: u32 = caps.get(1)?.as_str().parse().ok()?;
    if id == 0 || (style == HeadStyle::Dotted && is_year(id)) {
        return None;
    }
    Some((id, caps.get(2).map_or("", |m| m.as_str())))
}

/// Head style used by the majority of lines; bracket wins ties.
fn dominant_style(rows: &[Row]) -> Option<HeadStyle> {
    let count = |style| rows.iter().filter(|r| entry_head(&r.text, style).is_some()).count();
    let (bracket, dotted) = (count(HeadStyle::Bracket), count(HeadStyle::Dotted));
    match (bracket, dotted) {
        (0, 0) => None,
        (b, d) if b >= d => Some(HeadStyle::Bracket),
        _ => Some(HeadStyle::Dotted),
    }
}

fn push_text(entry: &mut String, text: &str) {
    for word in text.split_whitespace() {
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(word);
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Parse the document's reference list.
///
/// The list starts after the last reference heading found past the first
/// `search_start` fraction of pages; without one, the trailing
/// `fallback_pages` pages are scanned. It ends at the first appendix or
/// acknowledgments heading. Only lines beginning with an entry head of the
/// dominant style open entries; other lines continue the open entry.
pub fn parse_bibliography(
    pages: &[PageLayout],
    config: &BibliographyConfig,
    layout: &LayoutConfig,
) -> Bibliography {
    let rows: Vec<Row> = pages
        .iter()
        .enumerate()
        .flat_map(|(position, page)| {
            page.lines.iter().map(move |line| Row {
                page: page.number,
                line: line.index,
                position,
                text: LineText::build(line, layout).text.trim().to_string(),
            })
        })
        .collect();

    let first_position = (pages.len() as f64 * config.search_start).floor() as usize;
    let heading = rows
        .iter()
        .rposition(|r| r.position >= first_position && HEADING_RE.is_match(&r.text));

    let start = match heading {
        Some(h) => h + 1,
        None => {
            let tail = pages.len().saturating_sub(config.fallback_pages);
            match rows.iter().position(|r| r.position >= tail) {
                Some(s) => s,
                None => return Bibliography::default(),
            }
        }
    };
    let end = rows[start..]
        .iter()
        .position(|r| END_RE.is_match(&r.text))
        .map_or(rows.len(), |offset| start + offset);
    let region = &rows[start..end];

    let Some(style) = dominant_style(region) else {
        tracing::debug!(heading = heading.is_some(), "no bibliography entries found");
        return Bibliography::default();
    };

    let mut entries: Vec<RefEntry> = Vec::new();
    let mut first_entry_row: Option<usize> = None;
    for (i, row) in region.iter().enumerate() {
        if let Some((id, rest)) = entry_head(&row.text, style) {
            first_entry_row.get_or_insert(i);
            let mut text = String::new();
            push_text(&mut text, rest);
            entries.push(RefEntry {
                id,
                text,
                page: row.page,
                line: row.line,
                bracketed: style == HeadStyle::Bracket,
            });
        } else if let Some(entry) = entries.last_mut()
            && entry.text.chars().count() < config.max_entry_chars
        {
            push_text(&mut entry.text, &row.text);
        }
    }
    for entry in &mut entries {
        entry.text = truncate_chars(&entry.text, config.max_entry_chars);
    }

    let region_start = match (heading, first_entry_row) {
        (Some(h), _) => &rows[h],
        (None, Some(i)) => &region[i],
        (None, None) => return Bibliography::default(),
    };
    let region_end = &rows[end - 1];
    let bib = Bibliography::new(
        entries,
        Some(BibRegion {
            start: (region_start.page, region_start.line),
            end: (region_end.page, region_end.line),
        }),
    );
    tracing::debug!(
        entries = bib.len(),
        max_id = bib.max_id(),
        heading = heading.is_some(),
        style = ?style,
        "parsed bibliography"
    );
    bib
}
