/// Output Comparator
///
/// **Normalization Rules:**
/// - `\r\n` becomes `\n`
/// - Leading and trailing whitespace of the whole content is trimmed
///
/// **Preserves:**
/// - Internal whitespace (including per-line trailing spaces)
/// - Case sensitivity
/// - Empty lines within content

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::error;

/// Longest excerpt of program output kept in diagnostics
pub const MAX_EXCERPT_BYTES: usize = 1024;

/// Normalize output content for comparison
pub fn normalize(content: &str) -> String {
    content.replace("\r\n", "\n").trim().to_string()
}

/// Compare an actual output file with an expected output file
///
/// Unreadable files never compare equal.
pub fn equal(actual: &Path, expected: &Path) -> bool {
    match (read_normalized(actual), read_normalized(expected)) {
        (Ok(a), Ok(e)) => a == e,
        (Err(e), _) | (_, Err(e)) => {
            error!(
                actual = %actual.display(),
                expected = %expected.display(),
                error = %e,
                "Error comparing files"
            );
            false
        }
    }
}

/// Read a file and normalize it. Invalid UTF-8 is replaced, not rejected.
fn read_normalized(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(normalize(&String::from_utf8_lossy(&bytes)))
}

/// Normalized leading `max_bytes` of a file, for diagnostics
pub fn read_excerpt(path: &Path, max_bytes: u64) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    File::open(path)?.take(max_bytes).read_to_end(&mut bytes)?;
    Ok(normalize(&String::from_utf8_lossy(&bytes)))
}

/// Cut `text` to at most `max` bytes on a char boundary, marking the cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &text[..end])
}

/// Bounded human-readable description of an output mismatch
pub fn describe_mismatch(actual: &Path, expected: &Path) -> String {
    let excerpt = 2 * MAX_EXCERPT_BYTES as u64;
    let actual = read_excerpt(actual, excerpt).unwrap_or_else(|e| format!("<unreadable: {}>", e));
    let expected = read_excerpt(expected, excerpt).unwrap_or_else(|e| format!("<unreadable: {}>", e));
    format!(
        "Expected: \"{}\"\nGot:      \"{}\"",
        truncate(&expected, MAX_EXCERPT_BYTES),
        truncate(&actual, MAX_EXCERPT_BYTES)
    )
}
