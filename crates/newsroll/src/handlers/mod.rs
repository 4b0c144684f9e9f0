//! Command handlers

pub mod classify;
pub mod logs;
pub mod schema;

/// Truncate for table display (Unicode-safe)
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
        None => s.to_string(),
    }
}
