use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::pattern::{expand_pattern, has_placeholder};
pub use crate::config::toolchain::{DEFAULT_COMPILE_TIMEOUT, ExtractConfig, ToolchainConfig};
use crate::normalize::FileEncoding;

mod loader;
pub mod pattern;
pub mod toolchain;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../autograde.example.toml");

/// Header inclusions rejected when no deny list is configured
pub const DEFAULT_DENY_PATTERNS: [&str; 4] = [
    r"#include *<iostream>",
    r"#include *<cstring>",
    r"#include *<cstdlib>",
    r"#include *<cstdio>",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for a grading run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Assignment number, available as `{assignment}` in patterns
    #[serde(default = "default_assignment")]
    pub assignment: u32,

    /// Number of problems; problems are numbered `1..=problems`
    #[serde(default = "default_problems")]
    pub problems: u32,

    /// Wall-clock limit per test case in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Test cases of one problem run concurrently up to this many
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Maximum number of characters of stderr kept in a runtime error reason
    #[serde(default = "default_diagnostic_limit")]
    pub diagnostic_limit: usize,

    /// Keep the work directory after grading instead of removing it
    #[serde(default)]
    pub keep_work_dir: bool,

    /// Scratch directory, wiped for every candidate
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory holding `<task>.in` / `<task>.out` fixtures
    #[serde(default = "default_testdata_dir")]
    pub testdata_dir: PathBuf,

    /// Directory holding one sub-directory per candidate
    #[serde(default = "default_assignments_dir")]
    pub assignments_dir: PathBuf,

    /// JSON array of candidate identifiers
    #[serde(default = "default_roster")]
    pub roster: PathBuf,

    /// JSON object `problem -> task -> points`
    #[serde(default = "default_score_table")]
    pub score_table: PathBuf,

    /// Report file name pattern
    /// Placeholders: {assignment}
    #[serde(default = "default_report")]
    pub report: String,

    /// Source file name pattern
    /// Placeholders: {candidate}, {problem}, {assignment}
    #[serde(default = "default_source_pattern")]
    pub source_pattern: String,

    /// Submission archive name pattern
    /// Placeholders: {candidate}, {assignment}
    #[serde(default = "default_archive_pattern")]
    pub archive_pattern: String,

    /// Compiled artifact name pattern, the platform executable suffix is appended
    /// Placeholders: {problem}
    #[serde(default = "default_artifact_pattern")]
    pub artifact_pattern: String,

    /// Encoding every source is converted to before validation
    #[serde(default)]
    pub target_encoding: FileEncoding,

    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Unpacking command; without it submissions must be directories
    #[serde(default)]
    pub extract: Option<ExtractConfig>,

    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,
}

/// Source rewrites applied after encoding normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreprocessConfig {
    /// Lines inserted at the top of every source
    #[serde(default)]
    pub prologue: Vec<String>,

    /// Regular-expression rewrites, applied in order
    #[serde(default)]
    pub rewrites: Vec<Rewrite>,
}

/// One regular-expression rewrite; `replacement` may use `$1` captures
#[derive(Debug, Clone, Deserialize)]
pub struct Rewrite {
    pub pattern: String,
    pub replacement: String,
}

/// Forbidden-construct patterns, matched against each trimmed line
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_deny")]
    pub deny: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            deny: default_deny(),
        }
    }
}

impl Config {
    /// Create a new config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Source file name for a candidate and problem
    pub fn source_name(&self, candidate: &str, problem: u32) -> String {
        let problem = problem.to_string();
        let assignment = self.assignment.to_string();
        expand_pattern(
            &self.source_pattern,
            &[
                ("candidate", candidate),
                ("problem", &problem),
                ("assignment", &assignment),
            ],
        )
    }

    /// Archive (or directory) name of a candidate's submission
    pub fn archive_name(&self, candidate: &str) -> String {
        let assignment = self.assignment.to_string();
        expand_pattern(
            &self.archive_pattern,
            &[("candidate", candidate), ("assignment", &assignment)],
        )
    }

    /// Artifact file name for a problem
    pub fn artifact_name(&self, problem: u32) -> String {
        let problem = problem.to_string();
        let mut name = expand_pattern(&self.artifact_pattern, &[("problem", &problem)]);
        name.push_str(std::env::consts::EXE_SUFFIX);
        name
    }

    /// Report file path
    pub fn report_path(&self) -> PathBuf {
        let assignment = self.assignment.to_string();
        PathBuf::from(expand_pattern(
            &self.report,
            &[("assignment", &assignment)],
        ))
    }

    /// Test case wall-clock budget
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Compiler wall-clock budget
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.toolchain.timeout)
    }

    /// Problem numbers in order
    pub fn problem_ids(&self) -> RangeInclusive<u32> {
        1..=self.problems
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_assignment() -> u32 {
    1
}

fn default_problems() -> u32 {
    1
}

fn default_timeout() -> f64 {
    10.0
}

fn default_parallelism() -> usize {
    1
}

fn default_diagnostic_limit() -> usize {
    200
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_testdata_dir() -> PathBuf {
    PathBuf::from("./testdata")
}

fn default_assignments_dir() -> PathBuf {
    PathBuf::from("./assignments")
}

fn default_roster() -> PathBuf {
    PathBuf::from("./docs/student_list.json")
}

fn default_score_table() -> PathBuf {
    PathBuf::from("./docs/score_setting.json")
}

fn default_report() -> String {
    "hw_{assignment:02}.csv".to_owned()
}

fn default_source_pattern() -> String {
    "{candidate}_hw_{problem:02}.cpp".to_owned()
}

fn default_archive_pattern() -> String {
    "{candidate}_hw_w{assignment:02}.zip".to_owned()
}

fn default_artifact_pattern() -> String {
    "std_exec_{problem:02}".to_owned()
}

fn default_deny() -> Vec<String> {
    DEFAULT_DENY_PATTERNS.iter().map(|p| (*p).to_owned()).collect()
}
