//! A library for grading programming assignments.
//!
//! Autograde takes a roster of candidates, finds each candidate's
//! submission, compiles every problem with an external toolchain, runs the
//! artifacts against input/expected-output fixtures under a wall-clock
//! budget, and produces a score and a reason string per problem.
//!
//! # Features
//!
//! - **Encoding normalization**: sources in legacy encodings (Big5, GB2312, Latin-1) are converted before compiling.
//! - **Source validation**: a configurable deny-list of line patterns rejects forbidden headers.
//! - **Compilation gating**: a problem whose artifact is missing never runs and scores `CE`.
//! - **Bounded execution**: every test case has a wall-clock budget; timed out programs are killed.
//! - **TOML configuration**: naming patterns, toolchain command, rewrites and limits.
//! - **CSV reports**: one row per candidate with a score and reason per problem.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG};
pub use normalize::{FileEncoding, Normalization, NormalizeError, Preprocessor};
pub use report::{ReportError, render_report, write_report};
pub use roster::{Roster, ScoreTable};
pub use runner::{
    CompilationStage, ExecuteError, ExecutionStage, GradeError, Grader, aggregate, files_equal,
    lines_equal,
};
pub use submission::{Discovered, SubmissionError, discover, discover_all, stage};
pub use toolchain::{BuildJob, BuildOutput, CommandToolchain, Toolchain, ToolchainError};
pub use types::{
    BuildFailure, BuildVerdict, ExecutionOutcome, GradeRecord, Legality, ProblemResult,
    SubmissionUnit, TaskOutcome, TestCase,
};
pub use validate::{SourceValidator, Violation};
pub use workdir::{WorkDir, WorkDirError};

pub mod config;
pub mod normalize;
pub mod report;
pub mod roster;
pub mod runner;
pub mod submission;
pub mod toolchain;
pub mod types;
pub mod validate;
pub mod workdir;
