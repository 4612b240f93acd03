//! Input sanitation for text received from clients and backends.

use tracing::warn;

/// Longest text accepted from a client.
pub const MAX_INPUT_LENGTH: usize = 1024;

/// Characters that are never accepted in client supplied text.
const UNSAFE_CHARS: &[char] = &['$', '`', '\'', '"', '^', '[', ']', '{', '}', '\\', '<', '>'];

/// Characters replaced by a space in text shown to users.
const INSANE_CHARS: &[char] = &['\\', '\x0c', '\r', '\t'];

/// Returns true if the text is short enough and free of shell and markup
/// metacharacters.
pub fn strvalidate(text: &str) -> bool {
    let length = text.chars().count();
    if length > MAX_INPUT_LENGTH {
        warn!(length, "input too long");
        return false;
    }
    if let Some(c) = text.chars().find(|c| UNSAFE_CHARS.contains(c)) {
        warn!("invalid char '{}' in text", c);
        return false;
    }
    true
}

/// Replaces backslashes, form feeds, carriage returns and tabs with spaces.
pub fn strsafe(text: &str) -> String {
    text.chars()
        .map(|c| if INSANE_CHARS.contains(&c) { ' ' } else { c })
        .collect()
}
