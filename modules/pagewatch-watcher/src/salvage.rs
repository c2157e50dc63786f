//! Best-effort recovery of a summary from a length-truncated completion.
//!
//! When the provider cuts a structured response short, the JSON is usually
//! an unterminated `{"summary": "..."` document. Rather than lose the
//! partial text to a hard parse failure, scan for the summary string body
//! with a tolerant regex and unescape what was captured.

use regex::Regex;

/// Upper bound on recovered text. Anything longer is cut here.
pub const MAX_SALVAGE_CHARS: usize = 40_000;

/// Extract the (possibly unterminated) value of a `"summary"` string field.
/// Returns `None` when no field is found or the recovered text is blank.
pub fn salvage_summary(raw: &str) -> Option<String> {
    // Matches escaped-string bodies; an unterminated string matches up to
    // the end of the input.
    let re = Regex::new(r#""summary"\s*:\s*"((?:[^"\\]|\\.)*)"#)
        .expect("salvage regex is valid");

    let body = re.captures(raw)?.get(1)?.as_str();
    let text: String = unescape(body).chars().take(MAX_SALVAGE_CHARS).collect();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            // Trailing backslash from a mid-escape cut: drop it.
            None => {}
        }
    }
    out
}
