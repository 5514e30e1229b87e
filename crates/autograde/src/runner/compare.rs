//! Output comparison
//!
//! Both sides are split into lines at `\n`, `\r\n` or a lone `\r`, each
//! line is trimmed, and lines that end up empty are dropped. The remaining sequences must be identical. There is
//! no numeric tolerance and no reordering.

use std::path::Path;

use tracing::debug;

/// Significant lines of `text`: trimmed, blank lines removed
///
/// The empty piece between `\r` and `\n` is dropped with the blank lines.
fn significant_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n']).map(str::trim).filter(|line| !line.is_empty())
}

/// Compare produced output against expected output
pub fn lines_equal(produced: &str, expected: &str) -> bool {
    significant_lines(produced).eq(significant_lines(expected))
}

/// Compare the contents of two files
///
/// Invalid UTF-8 is replaced rather than rejected, so a program printing
/// garbage bytes gets a wrong answer instead of an error.
pub async fn files_equal(produced: &Path, expected: &Path) -> std::io::Result<bool> {
    let produced_bytes = tokio::fs::read(produced).await?;
    let expected_bytes = tokio::fs::read(expected).await?;

    let equal = lines_equal(
        &String::from_utf8_lossy(&produced_bytes),
        &String::from_utf8_lossy(&expected_bytes),
    );
    debug!(?produced, ?expected, equal, "compared output");
    Ok(equal)
}
