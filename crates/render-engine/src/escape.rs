//! Filtergraph escaping for literal text.
//!
//! One ordered substitution table covers every character with syntactic
//! meaning in an ffmpeg filtergraph. The backslash comes first so the
//! backslashes introduced by later entries are never escaped again.

/// `(character, replacement)` pairs, applied in order.
pub const ESCAPE_TABLE: [(char, &str); 7] = [
    ('\\', "\\\\"),
    ('\'', "\\'"),
    (':', "\\:"),
    ('[', "\\["),
    (']', "\\]"),
    (',', "\\,"),
    (';', "\\;"),
];

/// Escape `text` for use as a filter option value.
pub fn escape_filter_text(text: &str) -> String {
    ESCAPE_TABLE
        .iter()
        .fold(text.to_string(), |acc, (ch, replacement)| {
            acc.replace(*ch, replacement)
        })
}

/// Escape a filter option value embedded in a filtergraph.
///
/// The graph parser and the option parser each consume one level of
/// backslashes, so the table is applied once per level.
pub fn escape_option_value(text: &str) -> String {
    escape_filter_text(&escape_filter_text(text))
}

/// Reverse [`escape_filter_text`].
///
/// Only sequences produced by the table are collapsed; a stray backslash
/// before any other character is kept as-is.
pub fn unescape_filter_text(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if ESCAPE_TABLE.iter().any(|(reserved, _)| *reserved == next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Collapse embedded line breaks to single spaces.
///
/// drawtext gets one line per layer; callers wanting several lines use
/// several text elements.
pub fn flatten_lines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
