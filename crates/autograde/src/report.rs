//! CSV report
//!
//! One row per candidate with a score and a reason column per problem.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument};

use crate::types::GradeRecord;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render `records` as CSV covering problems `1..=problems`
///
/// Problems missing from a record render as an empty score and reason.
pub fn render_report(records: &[GradeRecord], problems: u32) -> String {
    let mut out = String::from("student_id");
    for problem in 1..=problems {
        let _ = write!(out, ",problem_{problem:02},reason_{problem:02}");
    }
    out.push('\n');

    for record in records {
        out.push_str(&csv_field(&record.candidate));
        for problem in 1..=problems {
            match record.problems.get(&problem) {
                Some(result) => {
                    let _ = write!(
                        out,
                        ",{},{}",
                        format_score(result.score),
                        csv_field(&result.reason())
                    );
                }
                None => out.push_str(",,"),
            }
        }
        out.push('\n');
    }
    out
}

/// Write the report to `path`, creating parent directories
#[instrument(skip(records))]
pub fn write_report(path: &Path, records: &[GradeRecord], problems: u32) -> Result<(), ReportError> {
    let content = render_report(records, problems);
    let map_err = |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(map_err)?;
    }
    std::fs::write(path, content).map_err(map_err)?;

    info!(?path, rows = records.len(), "report written");
    Ok(())
}

/// Integral scores render without a fractional part
pub fn format_score(score: f64) -> String {
    if score.is_finite() && score.fract() == 0.0 {
        format!("{score:.0}")
    } else {
        score.to_string()
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}
