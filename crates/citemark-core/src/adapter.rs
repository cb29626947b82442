//! Character Stream Adapter: turns [`RawPage`]s into immutable [`CharRecord`]s.

use crate::backend::{RawChar, RawColor, RawPage};
use crate::types::{BBox, CharId, CharRecord, Rgb};

/// A page of normalized characters plus its dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct PageChars {
    /// 1-based page number.
    pub number: usize,
    pub width: f64,
    pub height: f64,
    pub chars: Vec<CharRecord>,
}

/// Normalize one raw page. `number` is 1-based.
///
/// Characters with empty text, non-finite coordinates or a rotated baseline
/// are dropped, as are boxes lying wholly off the page. Boxes that straddle
/// the page edge are clamped to it. The survivors keep their original
/// extraction index in [`CharId::index`].
pub fn adapt_page(number: usize, raw: &RawPage) -> PageChars {
    let chars = raw
        .chars
        .iter()
        .enumerate()
        .filter_map(|(index, c)| adapt_char(CharId { page: number, index }, c, raw))
        .collect::<Vec<_>>();

    let dropped = raw.chars.len() - chars.len();
    if dropped > 0 {
        tracing::debug!(page = number, dropped, "dropped unusable characters");
    }

    PageChars {
        number,
        width: raw.width,
        height: raw.height,
        chars,
    }
}

/// Clamp `bbox` into a `width` × `height` page. `None` when the box lies
/// wholly outside it. Pages without usable dimensions are not clamped.
fn clamp_to_page(bbox: BBox, width: f64, height: f64) -> Option<BBox> {
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Some(bbox);
    }
    if bbox.x1 <= 0.0 || bbox.x0 >= width || bbox.bottom <= 0.0 || bbox.top >= height {
        return None;
    }
    Some(BBox::new(
        bbox.x0.max(0.0),
        bbox.x1.min(width),
        bbox.top.max(0.0),
        bbox.bottom.min(height),
    ))
}

fn adapt_char(id: CharId, c: &RawChar, page: &RawPage) -> Option<CharRecord> {
    if c.text.is_empty() || !c.upright {
        return None;
    }
    if ![c.x0, c.x1, c.top, c.bottom].iter().all(|v| v.is_finite()) {
        return None;
    }
    let raw_box = BBox::new(c.x0, c.x1, c.top, c.bottom);
    let size = match c.size {
        Some(s) if s.is_finite() && s > 0.0 => s,
        _ => raw_box.height(),
    };
    let bbox = clamp_to_page(raw_box, page.width, page.height)?;
    let fontname = c
        .fontname
        .as_deref()
        .map(strip_subset_prefix)
        .filter(|f| !f.is_empty())
        .map(str::to_string);
    let (bold, italic) = fontname.as_deref().map(style_from_font).unwrap_or((false, false));

    Some(CharRecord {
        id,
        text: c.text.clone(),
        bbox,
        fontname,
        size,
        color: c.color.as_ref().map(to_rgb).unwrap_or_default(),
        bold,
        italic,
        upright: c.upright,
    })
}

/// `"ABCDEF+Times-Roman"` → `"Times-Roman"`.
fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((prefix, rest))
            if prefix.len() == 6 && prefix.bytes().all(|b| b.is_ascii_uppercase()) =>
        {
            rest
        }
        _ => name,
    }
}

/// Derive (bold, italic) from a font name.
pub fn style_from_font(name: &str) -> (bool, bool) {
    let lower = name.to_ascii_lowercase();
    let bold = ["bold", "black", "heavy", "semibold", "demi"]
        .iter()
        .any(|k| lower.contains(k));
    let italic = ["ital", "oblique"].iter().any(|k| lower.contains(k))
        || lower.ends_with("-it")
        || lower.ends_with("-bdit");
    (bold, italic)
}

fn to_rgb(color: &RawColor) -> Rgb {
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match color {
        RawColor::Gray(g) => {
            let v = channel(*g);
            Rgb { r: v, g: v, b: v }
        }
        RawColor::Components(parts) => match parts.as_slice() {
            [g] => {
                let v = channel(*g);
                Rgb { r: v, g: v, b: v }
            }
            [r, g, b] => Rgb {
                r: channel(*r),
                g: channel(*g),
                b: channel(*b),
            },
            [c, m, y, k] => Rgb {
                r: channel((1.0 - c) * (1.0 - k)),
                g: channel((1.0 - m) * (1.0 - k)),
                b: channel((1.0 - y) * (1.0 - k)),
            },
            _ => Rgb::default(),
        },
    }
}
