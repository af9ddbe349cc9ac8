//! Masked / sensitive context extraction.
//!
//! For each finding we capture the enclosing "line" of the source twice:
//! verbatim (`sensitive_context`, encrypted at rest) and with every PII span
//! intersecting that line replaced by its `[TYPE]` token (`masked_context`,
//! safe to store in clear).
//!
//! Line boundaries are newline characters for plain text; for HTML sources
//! block-level tags (`<br>`, `<p>`, `<li>`, `<tr>`, `<td>`, `<div>`,
//! `<h1>`–`<h6>` and their closers) also break lines, so a finding inside a
//! table cell does not drag the whole row into its context.
//!
//! Entity spans that cross a line boundary are clamped to the line; masking
//! still removes whatever part of the span falls inside the line.

use crate::content::ContentKind;
use crate::entity::DetectedEntity;

/// Block-level tag prefixes that terminate a logical line in HTML content.
/// Matched case-insensitively at a `<`; the whole tag (through `>`) is
/// treated as the boundary.
const HTML_BREAK_TAGS: &[&str] = &[
    "br", "/br", "p", "/p", "li", "/li", "tr", "/tr", "td", "/td", "div", "/div", "h1", "/h1",
    "h2", "/h2", "h3", "/h3", "h4", "/h4", "h5", "/h5", "h6", "/h6",
];

/// Clamp a half-open span into `[0, source.len()]`, snapping both ends down
/// to char boundaries, and ensure `start <= end`.
pub fn clamp_span(source: &str, start: usize, end: usize) -> (usize, usize) {
    let mut s = start.min(source.len());
    let mut e = end.min(source.len());
    while s > 0 && !source.is_char_boundary(s) {
        s -= 1;
    }
    while e > 0 && !source.is_char_boundary(e) {
        e -= 1;
    }
    if s > e {
        s = e;
    }
    (s, e)
}

/// Byte range `[line_start, line_end)` of the logical line containing `pos`.
pub fn line_bounds(source: &str, pos: usize, kind: ContentKind) -> (usize, usize) {
    let (pos, _) = clamp_span(source, pos, pos);
    let breaks = match kind {
        ContentKind::Plain => newline_breaks(source),
        ContentKind::Html => {
            let mut b = newline_breaks(source);
            b.extend(html_tag_breaks(source));
            b.sort_unstable();
            b
        }
    };

    let mut start = 0;
    let mut end = source.len();
    for &(b_start, b_end) in &breaks {
        if b_end <= pos {
            start = start.max(b_end);
        } else if b_start >= pos {
            end = end.min(b_start);
            break;
        } else {
            // pos falls inside a break span (e.g. inside a tag) — the line
            // collapses to the empty range at the break start.
            return (b_start, b_start);
        }
    }
    (start, end)
}

fn newline_breaks(source: &str) -> Vec<(usize, usize)> {
    source
        .bytes()
        .enumerate()
        .filter(|(_, b)| *b == b'\n')
        .map(|(i, _)| (i, i + 1))
        .collect()
}

/// Spans of block-level break tags, from `<` through the matching `>`.
fn html_tag_breaks(source: &str) -> Vec<(usize, usize)> {
    let bytes = source.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' && is_break_tag_at(source, i) {
            let close = source[i..]
                .find('>')
                .map(|off| i + off + 1)
                .unwrap_or(source.len());
            out.push((i, close));
            i = close;
        } else {
            i += 1;
        }
    }
    out
}

fn is_break_tag_at(source: &str, lt: usize) -> bool {
    let rest = &source[lt + 1..];
    HTML_BREAK_TAGS.iter().any(|tag| {
        if rest.len() < tag.len() {
            return false;
        }
        let candidate = &rest[..tag.len()];
        if !candidate.eq_ignore_ascii_case(tag) {
            return false;
        }
        // Next char must end the tag name, so `<pre>` is not a `<p>` break.
        matches!(
            rest[tag.len()..].bytes().next(),
            None | Some(b'>') | Some(b' ') | Some(b'/') | Some(b'\t') | Some(b'\n')
        )
    })
}

/// Build the masked rendition of `source[line_start..line_end]`: every
/// entity span intersecting the line is replaced by its mask token,
/// applied left-to-right by ascending start offset; spans overlapping an
/// already-masked region are skipped.
pub fn mask_line(
    source: &str,
    line_start: usize,
    line_end: usize,
    entities: &[DetectedEntity],
) -> String {
    let mut spans: Vec<(usize, usize, String)> = entities
        .iter()
        .filter_map(|entity| {
            let (s, e) = clamp_span(source, entity.start, entity.end);
            if s < line_end && e > line_start && s < e {
                Some((s.max(line_start), e.min(line_end), entity.mask_token()))
            } else {
                None
            }
        })
        .collect();
    spans.sort_by_key(|(s, _, _)| *s);

    let mut masked = String::with_capacity(line_end - line_start);
    let mut cursor = line_start;
    for (s, e, token) in spans {
        if s < cursor {
            continue; // overlaps a span already masked
        }
        masked.push_str(&source[cursor..s]);
        masked.push_str(&token);
        cursor = e;
    }
    masked.push_str(&source[cursor..line_end]);
    masked
}

/// Fill in `sensitive_context` / `masked_context` for every entity that does
/// not already carry them.  Masking for a given entity considers all sibling
/// entities intersecting the same line, not just the subject.
pub fn enrich_entities(source: &str, entities: &mut [DetectedEntity], kind: ContentKind) {
    let snapshot: Vec<DetectedEntity> = entities.to_vec();
    for entity in entities.iter_mut() {
        if entity.has_context() {
            continue;
        }
        let (start, end) = clamp_span(source, entity.start, entity.end);
        entity.start = start;
        entity.end = end;
        let (line_start, line_end) = line_bounds(source, start, kind);
        entity.sensitive_context = source[line_start..line_end].to_string();
        entity.masked_context = mask_line(source, line_start, line_end, &snapshot);
    }
}
