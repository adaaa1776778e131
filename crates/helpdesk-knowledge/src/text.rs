//! Char-aware length helpers. All budgets and thresholds count chars, not bytes.

/// Number of chars in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`-th char, or `s.len()` if `s` is shorter.
pub fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// Longest prefix of `s` holding at most `max_chars` chars.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    &s[..byte_offset(s, max_chars)]
}

/// Cut point for a window of at most `max_chars` chars, preferring the last
/// whitespace inside the window. Always makes progress on non-empty input.
pub fn window_end(s: &str, max_chars: usize) -> usize {
    let hard = byte_offset(s, max_chars);
    if hard >= s.len() {
        return s.len();
    }
    match s[..hard].rfind(char::is_whitespace) {
        Some(ws) if ws > 0 => {
            // Keep the whitespace char with the left window.
            ws + s[ws..].chars().next().map_or(1, char::len_utf8)
        }
        _ => hard.max(s.chars().next().map_or(0, char::len_utf8)),
    }
}
