//! Grading pipeline
//!
//! Candidates are graded one after another in a shared work directory. For
//! each candidate the submission is staged, every problem is compiled, and
//! the test cases of every built problem are executed and aggregated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub use crate::runner::aggregate::aggregate;
pub use crate::runner::compare::{files_equal, lines_equal};
pub use crate::runner::compile::CompilationStage;
pub use crate::runner::execute::ExecutionStage;

mod aggregate;
mod compare;
mod compile;
mod execute;

use crate::config::{Config, ConfigError};
use crate::normalize::Preprocessor;
use crate::roster::{Roster, ScoreTable};
use crate::submission::{self, SubmissionError};
use crate::toolchain::{CommandToolchain, Toolchain};
use crate::types::{BuildVerdict, GradeRecord, ProblemResult, TaskOutcome};
use crate::validate::SourceValidator;
use crate::workdir::{WorkDir, WorkDirError};

/// Errors around a single test case run, outside the program itself
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("failed to launch {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("work directory error: {0}")]
    WorkDir(#[from] WorkDirError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop grading
#[derive(Debug, Error)]
pub enum GradeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("work directory error: {0}")]
    WorkDir(#[from] WorkDirError),
}

impl GradeError {
    /// Whether this error must halt the whole batch
    pub fn is_duplicate_submission(&self) -> bool {
        matches!(
            self,
            GradeError::Submission(SubmissionError::DuplicateSubmission { .. })
        )
    }
}

/// Drives the full pipeline for a roster
#[derive(Debug)]
pub struct Grader<T: Toolchain = CommandToolchain> {
    config: Config,
    scores: ScoreTable,
    toolchain: T,
    preprocessor: Arc<Preprocessor>,
    validator: Arc<SourceValidator>,
}

impl Grader<CommandToolchain> {
    /// Create a grader running the configured compiler command
    pub fn new(config: Config, scores: ScoreTable) -> Result<Self, GradeError> {
        let toolchain = CommandToolchain::from_config(&config);
        Self::with_toolchain(config, scores, toolchain)
    }
}

impl<T: Toolchain> Grader<T> {
    /// Create a grader with a custom toolchain
    pub fn with_toolchain(
        config: Config,
        scores: ScoreTable,
        toolchain: T,
    ) -> Result<Self, GradeError> {
        let preprocessor = Preprocessor::from_config(config.target_encoding, &config.preprocess)?;
        let validator =
            SourceValidator::from_config(&config.validator)?.with_encoding(config.target_encoding);
        Ok(Self {
            config,
            scores,
            toolchain,
            preprocessor: Arc::new(preprocessor),
            validator: Arc::new(validator),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scores(&self) -> &ScoreTable {
        &self.scores
    }

    /// Grade every candidate on the roster, in roster order
    ///
    /// All submissions are discovered first, so a duplicate halts the batch
    /// before any candidate is graded. Any other failure is confined to the
    /// candidate it happened for.
    #[instrument(skip_all, fields(candidates = roster.len()))]
    pub async fn grade_batch(&self, roster: &Roster) -> Result<Vec<GradeRecord>, GradeError> {
        let discovered = match submission::discover_all(&self.config, roster).await {
            Ok(discovered) => discovered,
            Err(e) => {
                error!(error = %e, "submission discovery failed, stopping");
                return Err(e.into());
            }
        };

        let mut records = Vec::with_capacity(discovered.len());
        for (idx, entry) in discovered.iter().enumerate() {
            info!(
                candidate = %entry.candidate,
                index = idx + 1,
                of = discovered.len(),
                "grading candidate"
            );
            let record = match self
                .grade_candidate(&entry.candidate, entry.submission.as_deref())
                .await
            {
                Ok(record) => record,
                Err(e) => {
                    warn!(candidate = %entry.candidate, error = %e, "grading failed for candidate");
                    GradeRecord::uniform(
                        &entry.candidate,
                        self.config.problems,
                        ProblemResult::system_error(),
                    )
                }
            };
            info!(candidate = %entry.candidate, total = record.total(), "candidate graded");
            records.push(record);
        }
        Ok(records)
    }

    /// Grade one candidate whose submission was already discovered
    ///
    /// A candidate without a submission scores zero on every problem
    /// without touching the work directory.
    #[instrument(skip(self, submission))]
    pub async fn grade_candidate(
        &self,
        candidate: &str,
        submission: Option<&Path>,
    ) -> Result<GradeRecord, GradeError> {
        let Some(submission) = submission else {
            info!("no submission");
            return Ok(GradeRecord::uniform(
                candidate,
                self.config.problems,
                ProblemResult::no_submission(),
            ));
        };

        let workdir = WorkDir::acquire(&self.config.work_dir).await?;
        submission::stage(&self.config, &workdir, candidate, submission).await?;
        let record = self.grade_staged(&workdir, candidate).await;

        if self.config.keep_work_dir {
            let kept = workdir.keep();
            info!(path = %kept.display(), "work directory kept");
        } else {
            workdir.release().await?;
        }
        Ok(record)
    }

    /// Compile and test sources already staged at the root of `workdir`
    pub async fn grade_staged(&self, workdir: &WorkDir, candidate: &str) -> GradeRecord {
        let stage = CompilationStage::new(
            &self.config,
            &self.toolchain,
            Arc::clone(&self.preprocessor),
            Arc::clone(&self.validator),
        );
        let units = stage.build(workdir, candidate).await;
        let execution = ExecutionStage::new(&self.config, workdir.path());

        let mut record = GradeRecord::new(candidate);
        for unit in &units {
            let outcomes = match &unit.build {
                BuildVerdict::Built(artifact) => {
                    let cases = self
                        .scores
                        .test_cases(unit.problem, &self.config.testdata_dir);
                    execution.run_all(artifact, &cases).await
                }
                // Gated: the artifact is never launched
                BuildVerdict::Untested | BuildVerdict::Failed(_) => Vec::<TaskOutcome>::new(),
            };
            let result = aggregate(&unit.build, &outcomes);
            info!(
                problem = unit.problem,
                score = result.score,
                reason = %result.reason(),
                "problem graded"
            );
            record.problems.insert(unit.problem, result);
        }
        record
    }
}
