//! Parsing of citation marker text (`"1-3,7"`, `"[12]"`, `"¹²"`) into numeric
//! reference IDs.

/// Widest range a dash may expand to. `"1-500"` is noise, not a citation.
pub const MAX_RANGE_SPAN: u32 = 20;

/// Largest ID accepted from marker text.
pub const MAX_CITATION_ID: u32 = 999;

/// Map a Unicode superscript digit to its ASCII digit.
pub fn superscript_digit(c: char) -> Option<char> {
    Some(match c {
        '⁰' => '0',
        '¹' => '1',
        '²' => '2',
        '³' => '3',
        '⁴' => '4',
        '⁵' => '5',
        '⁶' => '6',
        '⁷' => '7',
        '⁸' => '8',
        '⁹' => '9',
        _ => return None,
    })
}

/// Whether `c` is rendered as a superscript by its code point alone.
pub fn is_unicode_superscript(c: char) -> bool {
    matches!(c, '¹' | '²' | '³' | '\u{2070}'..='\u{207F}')
}

/// Normalize raw marker text into a compact parseable form.
///
/// Superscript digits become ASCII, every dash variant becomes `-`,
/// whitespace is removed and one layer of wrapping `[]` or `()` is stripped.
pub fn normalize_ref_text(raw: &str) -> String {
    let s: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            '⁻' => '-',
            '⁽' => '(',
            '⁾' => ')',
            c => superscript_digit(c).unwrap_or(c),
        })
        .collect();

    let wrapped = (s.starts_with('[') && s.ends_with(']')) || (s.starts_with('(') && s.ends_with(')'));
    if s.len() >= 2 && wrapped {
        s[1..s.len() - 1].to_string()
    } else {
        s
    }
}

/// Parse marker text into reference IDs.
///
/// Parts are separated by `,` or `;`; a part `a-b` expands to the inclusive
/// range when `b - a <= MAX_RANGE_SPAN`. Zero, leading zeros (`"01"`) and IDs
/// above [`MAX_CITATION_ID`] are rejected. Malformed parts are skipped rather
/// than failing the whole marker. Output order follows the text, duplicates
/// removed.
pub fn parse_ref_ids(raw: &str) -> Vec<u32> {
    let normalized = normalize_ref_text(raw);
    let mut out: Vec<u32> = Vec::new();

    for part in normalized.split([',', ';']).filter(|p| !p.is_empty()) {
        let ids = match part.split_once('-') {
            Some((a, b)) => match (parse_single(a), parse_single(b)) {
                (Some(start), Some(end)) if end >= start && end - start <= MAX_RANGE_SPAN => {
                    (start..=end).collect()
                }
                _ => continue,
            },
            None => match parse_single(part) {
                Some(id) => vec![id],
                None => continue,
            },
        };
        for id in ids {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

fn parse_single(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    let id: u32 = s.parse().ok()?;
    (1..=MAX_CITATION_ID).contains(&id).then_some(id)
}

/// Whether the text contains at least one digit after normalization.
pub fn has_digit(raw: &str) -> bool {
    normalize_ref_text(raw).bytes().any(|b| b.is_ascii_digit())
}
