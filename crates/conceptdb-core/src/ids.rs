//! Identity and text helpers.

/// Derive a stable identifier from ordered parts.
///
/// Parts are hashed with BLAKE3, separated by a NUL byte so `("ab", "c")`
/// and `("a", "bc")` produce different ids. The result is the first 32 hex
/// characters of the digest.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(&[0]);
        }
        hasher.update(part.as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..32].to_string()
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
