use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Reason recorded when a problem could not be built
pub const COMPILE_ERROR_REASON: &str = "CE";

/// Reason recorded for every problem of a candidate without a submission
pub const NO_SUBMISSION_REASON: &str = "no submission";

/// Reason recorded when grading a candidate failed for reasons outside their code
pub const SYSTEM_ERROR_REASON: &str = "SE";

/// Separator between reason tokens in a rendered reason string
pub const REASON_SEPARATOR: &str = ", ";

/// Legality verdict of a submission unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Legality {
    /// Validator has not run yet
    #[default]
    Untested,

    /// No deny-listed construct found
    Legal,

    /// A deny-listed construct was found, or the file could not be scanned
    Illegal,
}

/// Build verdict of a submission unit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BuildVerdict {
    /// Compilation stage has not processed the unit yet
    #[default]
    Untested,

    /// Artifact exists at the given path
    Built(PathBuf),

    /// Unit can not be executed
    Failed(BuildFailure),
}

/// Why a unit ended up not buildable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildFailure {
    /// Expected source file was not part of the submission
    SourceNotFound,

    /// Source encoding is outside the supported set
    UnsupportedEncoding(String),

    /// Validator rejected the source
    IllegalConstruct,

    /// Normalization or rewriting failed for another reason
    Preprocess(String),

    /// Toolchain ran but no artifact was produced
    CompileError,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildFailure::SourceNotFound => write!(f, "source not found"),
            BuildFailure::UnsupportedEncoding(name) => write!(f, "unsupported encoding '{name}'"),
            BuildFailure::IllegalConstruct => write!(f, "illegal construct"),
            BuildFailure::Preprocess(message) => write!(f, "preprocessing failed: {message}"),
            BuildFailure::CompileError => write!(f, "compile error"),
        }
    }
}

/// One candidate's source file for one problem
#[derive(Debug, Clone)]
pub struct SubmissionUnit {
    pub candidate: String,
    pub problem: u32,
    pub source: PathBuf,
    pub legality: Legality,
    pub build: BuildVerdict,
}

impl SubmissionUnit {
    pub fn new(candidate: impl Into<String>, problem: u32, source: impl Into<PathBuf>) -> Self {
        Self {
            candidate: candidate.into(),
            problem,
            source: source.into(),
            legality: Legality::Untested,
            build: BuildVerdict::Untested,
        }
    }

    /// Mark the unit as not buildable
    pub fn fail(&mut self, failure: BuildFailure) {
        self.build = BuildVerdict::Failed(failure);
    }

    /// Path of the compiled artifact, if the unit was built
    pub fn artifact(&self) -> Option<&Path> {
        match &self.build {
            BuildVerdict::Built(path) => Some(path),
            BuildVerdict::Untested | BuildVerdict::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn is_buildable(&self) -> bool {
        self.artifact().is_some()
    }
}

/// Per-problem buildable flags, in problem order
pub fn buildable_mask(units: &[SubmissionUnit]) -> Vec<bool> {
    units.iter().map(SubmissionUnit::is_buildable).collect()
}

/// A single input/expected-output pair
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub problem: u32,
    pub task: String,
    pub input: PathBuf,
    pub expected: PathBuf,
    pub points: f64,
}

/// Result of running one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExecutionOutcome {
    /// Exited with zero status and output matched
    Success,

    /// Exited with zero status but output differed
    WrongAnswer,

    /// Wall-clock budget exceeded; the process was killed
    Timeout,

    /// Non-zero exit, signal, or failure around the run; carries a diagnostic
    RuntimeError(String),

    /// Problem was never built
    CompileError,

    /// Artifact could not be launched
    Missing,
}

impl ExecutionOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success)
    }

    /// Whether this outcome turns the whole problem into a compile error
    pub fn is_build_failure(&self) -> bool {
        matches!(self, ExecutionOutcome::CompileError | ExecutionOutcome::Missing)
    }

    /// Short status code, used in logs
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success => "AC",
            ExecutionOutcome::WrongAnswer => "WA",
            ExecutionOutcome::Timeout => "TLE",
            ExecutionOutcome::RuntimeError(_) => "RE",
            ExecutionOutcome::CompileError => "CE",
            ExecutionOutcome::Missing => "MISSING",
        }
    }

    /// Reason token for a task with this outcome, `None` when it passed
    pub fn reason_token(&self, task: &str) -> Option<String> {
        match self {
            ExecutionOutcome::Success => None,
            ExecutionOutcome::WrongAnswer => Some(task.to_owned()),
            ExecutionOutcome::Timeout => Some(format!("{task}-TLE")),
            ExecutionOutcome::RuntimeError(diagnostic) if diagnostic.is_empty() => {
                Some(format!("{task}-RE"))
            }
            ExecutionOutcome::RuntimeError(diagnostic) => Some(format!("{task}-RE {diagnostic}")),
            ExecutionOutcome::CompileError | ExecutionOutcome::Missing => {
                Some(COMPILE_ERROR_REASON.to_owned())
            }
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of one task together with the points it is worth
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task: String,
    pub outcome: ExecutionOutcome,
    pub points: f64,
}

/// Score and failure reasons for one problem
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProblemResult {
    /// Sum of the points of passed tasks
    pub score: f64,

    /// Reason tokens in task order
    pub reasons: Vec<String>,
}

impl ProblemResult {
    /// Zero score with a single sentinel reason
    pub fn sentinel(reason: &str) -> Self {
        Self {
            score: 0.0,
            reasons: vec![reason.to_owned()],
        }
    }

    pub fn compile_error() -> Self {
        Self::sentinel(COMPILE_ERROR_REASON)
    }

    pub fn no_submission() -> Self {
        Self::sentinel(NO_SUBMISSION_REASON)
    }

    pub fn system_error() -> Self {
        Self::sentinel(SYSTEM_ERROR_REASON)
    }

    /// Reason tokens joined into one string (empty on full score)
    pub fn reason(&self) -> String {
        self.reasons.join(REASON_SEPARATOR)
    }
}

/// All problem results for one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeRecord {
    pub candidate: String,
    pub problems: BTreeMap<u32, ProblemResult>,
}

impl GradeRecord {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            problems: BTreeMap::new(),
        }
    }

    /// Record with the same result for problems `1..=problems`
    pub fn uniform(candidate: impl Into<String>, problems: u32, result: ProblemResult) -> Self {
        Self {
            candidate: candidate.into(),
            problems: (1..=problems).map(|pid| (pid, result.clone())).collect(),
        }
    }

    pub fn total(&self) -> f64 {
        self.problems.values().map(|result| result.score).sum()
    }
}
