//! Source legality checks
//!
//! A source is legal when none of the deny-listed patterns match any of its
//! lines. Each physical line is trimmed before matching. This is plain
//! pattern matching over text, not analysis of the program. Sources are
//! decoded from the configured target encoding before matching.

use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{ConfigError, DEFAULT_DENY_PATTERNS, ValidatorConfig};
use crate::normalize::{FileEncoding, NormalizeError, read_text};
use crate::types::Legality;

/// First deny-listed match found in a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// 1-based line number
    pub line: usize,
    /// The pattern that matched
    pub pattern: String,
}

/// Applies a deny-list of line patterns to source files
#[derive(Debug, Clone)]
pub struct SourceValidator {
    deny: Vec<Regex>,
    encoding: FileEncoding,
}

impl SourceValidator {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let deny = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    pattern: pattern.to_owned(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            deny,
            encoding: FileEncoding::default(),
        })
    }

    pub fn from_config(config: &ValidatorConfig) -> Result<Self, ConfigError> {
        Self::new(&config.deny)
    }

    /// Decode sources from `encoding` instead of UTF-8
    pub fn with_encoding(mut self, encoding: FileEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Find the first violation in `text`
    pub fn check_text(&self, text: &str) -> Option<Violation> {
        text.lines()
            .enumerate()
            .find_map(|(idx, line)| self.check_line(idx + 1, line))
    }

    fn check_line(&self, line_no: usize, line: &str) -> Option<Violation> {
        let line = line.trim();
        self.deny
            .iter()
            .find(|pattern| pattern.is_match(line))
            .map(|pattern| Violation {
                line: line_no,
                pattern: pattern.as_str().to_owned(),
            })
    }

    /// Scan the file at `path` line by line for the first violation
    pub fn find_violation(&self, path: &Path) -> Result<Option<Violation>, NormalizeError> {
        let text = read_text(path, self.encoding)?;
        Ok(self.check_text(&text))
    }

    /// Whether the file at `path` is free of deny-listed constructs
    ///
    /// Read failures count as illegal.
    pub fn check_legal(&self, path: &Path) -> bool {
        self.verdict(path) == Legality::Legal
    }

    /// Legality verdict for the file at `path`
    pub fn verdict(&self, path: &Path) -> Legality {
        match self.find_violation(path) {
            Ok(None) => {
                debug!(?path, "source is legal");
                Legality::Legal
            }
            Ok(Some(violation)) => {
                warn!(
                    ?path,
                    line = violation.line,
                    pattern = %violation.pattern,
                    "source contains a forbidden construct"
                );
                Legality::Illegal
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to scan source, treating as illegal");
                Legality::Illegal
            }
        }
    }
}

impl Default for SourceValidator {
    fn default() -> Self {
        Self {
            deny: DEFAULT_DENY_PATTERNS
                .iter()
                .filter_map(|pattern| Regex::new(pattern).ok())
                .collect(),
            encoding: FileEncoding::default(),
        }
    }
}
