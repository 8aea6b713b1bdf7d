//! Whitespace normalization for extracted fapiao text.

use super::patterns::WHITESPACE_RUN;

/// Collapse newlines and whitespace runs (including U+3000) into single ASCII spaces.
pub fn normalize(text: &str) -> String {
    let flattened = text.replace(['\r', '\n'], " ");
    WHITESPACE_RUN
        .replace_all(&flattened, " ")
        .trim()
        .to_string()
}

/// Keep the first `max_chars` characters, appending `...` when the text was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
