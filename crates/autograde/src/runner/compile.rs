//! Compilation stage
//!
//! Turns a candidate's staged sources into artifacts. Every unit passes the
//! same gates in order: source present, encoding normalized, source legal,
//! artifact produced. The first gate a unit fails decides its verdict and
//! later gates are skipped for it.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::normalize::{NormalizeError, Preprocessor};
use crate::toolchain::{BuildJob, Toolchain};
use crate::types::{BuildFailure, BuildVerdict, Legality, SubmissionUnit, buildable_mask};
use crate::validate::SourceValidator;
use crate::workdir::WorkDir;

/// Prepares, validates and compiles one candidate's sources
#[derive(Debug)]
pub struct CompilationStage<'a, T: Toolchain> {
    config: &'a Config,
    toolchain: &'a T,
    preprocessor: Arc<Preprocessor>,
    validator: Arc<SourceValidator>,
}

impl<'a, T: Toolchain> CompilationStage<'a, T> {
    pub fn new(
        config: &'a Config,
        toolchain: &'a T,
        preprocessor: Arc<Preprocessor>,
        validator: Arc<SourceValidator>,
    ) -> Self {
        Self {
            config,
            toolchain,
            preprocessor,
            validator,
        }
    }

    /// Build every problem of `candidate` inside `workdir`
    ///
    /// Sources are expected at the work directory root under the configured
    /// source name. Returns one unit per problem, in problem order.
    #[instrument(skip(self, workdir), fields(workdir = %workdir.path().display()))]
    pub async fn build(&self, workdir: &WorkDir, candidate: &str) -> Vec<SubmissionUnit> {
        let mut units = Vec::with_capacity(self.config.problems as usize);
        for problem in self.config.problem_ids() {
            units.push(self.prepare_unit(workdir, candidate, problem).await);
        }

        for unit in &mut units {
            if unit.legality == Legality::Legal {
                self.compile_unit(workdir, unit).await;
            }
        }

        let built = units.iter().filter(|unit| unit.is_buildable()).count();
        info!(candidate, built, total = units.len(), "compilation finished");
        units
    }

    /// Per-problem buildable flags for `candidate`
    pub async fn buildable(&self, workdir: &WorkDir, candidate: &str) -> Vec<bool> {
        buildable_mask(&self.build(workdir, candidate).await)
    }

    /// Locate, normalize and validate one source
    async fn prepare_unit(&self, workdir: &WorkDir, candidate: &str, problem: u32) -> SubmissionUnit {
        let name = self.config.source_name(candidate, problem);
        let source = match workdir.file_path(&name) {
            Ok(path) => path,
            Err(e) => {
                warn!(problem, error = %e, "invalid source name");
                let mut unit = SubmissionUnit::new(candidate, problem, name);
                unit.fail(BuildFailure::Preprocess(e.to_string()));
                return unit;
            }
        };
        let mut unit = SubmissionUnit::new(candidate, problem, source);

        if !tokio::fs::try_exists(&unit.source).await.unwrap_or(false) {
            debug!(problem, "source not found");
            unit.fail(BuildFailure::SourceNotFound);
            return unit;
        }

        // Runs on the blocking pool; an error or panic there only affects this unit
        let preprocessor = Arc::clone(&self.preprocessor);
        let validator = Arc::clone(&self.validator);
        let path = unit.source.clone();
        let checked = tokio::task::spawn_blocking(move || {
            preprocessor
                .prepare(&path)
                .map(|normalization| (normalization, validator.verdict(&path)))
        })
        .await;

        match checked {
            Ok(Ok((normalization, legality))) => {
                debug!(problem, ?normalization, ?legality, "source prepared");
                unit.legality = legality;
                if legality == Legality::Illegal {
                    warn!(problem, "source rejected by validator");
                    unit.fail(BuildFailure::IllegalConstruct);
                }
            }
            Ok(Err(NormalizeError::UnsupportedEncoding(encoding))) => {
                warn!(problem, %encoding, "unsupported source encoding");
                unit.fail(BuildFailure::UnsupportedEncoding(encoding));
            }
            Ok(Err(e)) => {
                warn!(problem, error = %e, "failed to prepare source");
                unit.fail(BuildFailure::Preprocess(e.to_string()));
            }
            Err(e) => {
                warn!(problem, error = %e, "source preparation aborted");
                unit.fail(BuildFailure::Preprocess(e.to_string()));
            }
        }
        unit
    }

    /// Run the toolchain for one legal unit and probe for its artifact
    async fn compile_unit(&self, workdir: &WorkDir, unit: &mut SubmissionUnit) {
        let problem = unit.problem;
        let artifact = match workdir.file_path(&self.config.artifact_name(problem)) {
            Ok(path) => path,
            Err(e) => {
                warn!(problem, error = %e, "invalid artifact name");
                unit.fail(BuildFailure::CompileError);
                return;
            }
        };

        // A leftover artifact must not pass for a fresh build
        remove_stale(&artifact).await;

        let job = BuildJob {
            problem,
            source: unit.source.clone(),
            artifact: artifact.clone(),
            working_dir: workdir.path().to_path_buf(),
        };

        match self.toolchain.build(&job).await {
            Ok(output) if !output.success() => {
                debug!(problem, exit_code = ?output.exit_code, output = %output.output, "compiler reported failure");
            }
            Ok(_) => {}
            Err(e) => warn!(problem, error = %e, "toolchain invocation failed"),
        }

        // The artifact decides, not the exit code
        if tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
            debug!(problem, ?artifact, "artifact built");
            unit.build = BuildVerdict::Built(artifact);
        } else {
            warn!(problem, "no artifact produced");
            unit.fail(BuildFailure::CompileError);
        }
    }
}

async fn remove_stale(artifact: &Path) {
    match tokio::fs::remove_file(artifact).await {
        Ok(()) => debug!(?artifact, "removed stale artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(?artifact, error = %e, "failed to remove stale artifact"),
    }
}
