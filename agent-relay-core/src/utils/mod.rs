//! Utility functions and helpers

/// Create a safe path component from a string
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`, and a name made only of
/// dots is replaced so it can never point at a parent directory.
pub fn safe_filename(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();

    if safe.is_empty() || safe.chars().all(|c| c == '.') {
        "_".repeat(safe.len().max(1))
    } else {
        safe
    }
}
