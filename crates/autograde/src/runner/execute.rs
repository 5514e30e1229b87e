//! Test case execution
//!
//! Runs a compiled artifact against one input fixture with a wall-clock
//! budget and classifies what happened. Every run is independent: a hanging
//! or crashing program only affects its own outcome.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::runner::ExecuteError;
use crate::runner::compare::files_equal;
use crate::types::{ExecutionOutcome, TaskOutcome, TestCase};
use crate::workdir::checked_join;

/// What a finished child process left behind
enum RunStatus {
    Exited {
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut,
}

/// Runs artifacts against test cases
#[derive(Debug, Clone)]
pub struct ExecutionStage {
    timeout: Duration,
    diagnostic_limit: usize,
    parallelism: usize,
    /// Directory receiving produced output files; also the child's working directory
    output_dir: PathBuf,
}

impl ExecutionStage {
    pub fn new(config: &Config, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            timeout: config.run_timeout(),
            diagnostic_limit: config.diagnostic_limit,
            parallelism: config.parallelism.max(1),
            output_dir: output_dir.into(),
        }
    }

    /// Override the per-run wall-clock budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the number of test cases run at once
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Name of the file receiving the produced output of a test case
    pub fn output_name(case: &TestCase) -> String {
        format!("user_{:02}_{}.out", case.problem, case.task)
    }

    /// Run one test case
    ///
    /// Never fails: problems around the run (unreadable fixtures, unwritable
    /// output) become a runtime error carrying the error text.
    #[instrument(skip(self, artifact, case), fields(problem = case.problem, task = %case.task))]
    pub async fn run(&self, artifact: &Path, case: &TestCase) -> ExecutionOutcome {
        let outcome = match self.try_run(artifact, case).await {
            Ok(outcome) => outcome,
            Err(ExecuteError::Spawn { path, source }) => {
                warn!(?path, error = %source, "artifact could not be launched");
                ExecutionOutcome::Missing
            }
            Err(e) => {
                warn!(error = %e, "test case failed outside the program");
                ExecutionOutcome::RuntimeError(truncate(&e.to_string(), self.diagnostic_limit))
            }
        };
        debug!(outcome = %outcome, "test case finished");
        outcome
    }

    async fn try_run(
        &self,
        artifact: &Path,
        case: &TestCase,
    ) -> Result<ExecutionOutcome, ExecuteError> {
        let input = tokio::fs::read(&case.input)
            .await
            .map_err(|source| ExecuteError::Fixture {
                path: case.input.clone(),
                source,
            })?;

        let (status, stdout, stderr) =
            match run_process(artifact, &self.output_dir, input, self.timeout).await? {
                RunStatus::TimedOut => return Ok(ExecutionOutcome::Timeout),
                RunStatus::Exited {
                    status,
                    stdout,
                    stderr,
                } => (status, stdout, stderr),
            };

        if !status.success() {
            return Ok(ExecutionOutcome::RuntimeError(
                self.failure_diagnostic(status, &stderr),
            ));
        }

        let produced = checked_join(&self.output_dir, &Self::output_name(case))?;
        tokio::fs::write(&produced, &stdout)
            .await
            .map_err(|source| ExecuteError::Output {
                path: produced.clone(),
                source,
            })?;

        let expected = case.expected.as_path();
        let equal = files_equal(&produced, expected)
            .await
            .map_err(|source| ExecuteError::Fixture {
                path: case.expected.clone(),
                source,
            })?;

        Ok(if equal {
            ExecutionOutcome::Success
        } else {
            ExecutionOutcome::WrongAnswer
        })
    }

    /// Diagnostic for a run that did not exit cleanly
    fn failure_diagnostic(&self, status: ExitStatus, stderr: &[u8]) -> String {
        let stderr = String::from_utf8_lossy(stderr);
        let stderr = stderr.trim();

        let text = match (status.code(), termination_signal(status)) {
            (Some(_), _) if !stderr.is_empty() => stderr.to_owned(),
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) if stderr.is_empty() => format!("killed by signal {signal}"),
            (None, Some(signal)) => format!("killed by signal {signal}: {stderr}"),
            (None, None) => stderr.to_owned(),
        };
        truncate(&text, self.diagnostic_limit)
    }

    /// Run every test case of one problem, keeping the order of `cases`
    ///
    /// Up to `parallelism` cases run at the same time. The artifact is only
    /// read and every case writes its own output file.
    pub async fn run_all(&self, artifact: &Path, cases: &[TestCase]) -> Vec<TaskOutcome> {
        if self.parallelism <= 1 || cases.len() <= 1 {
            let mut outcomes = Vec::with_capacity(cases.len());
            for case in cases {
                outcomes.push(task_outcome(case, self.run(artifact, case).await));
            }
            return outcomes;
        }

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut set = JoinSet::new();
        for (idx, case) in cases.iter().cloned().enumerate() {
            let stage = self.clone();
            let artifact = artifact.to_path_buf();
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (idx, stage.run(&artifact, &case).await)
            });
        }

        let mut results: Vec<Option<ExecutionOutcome>> = vec![None; cases.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => results[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "test case task did not complete"),
            }
        }

        cases
            .iter()
            .zip(results)
            .map(|(case, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    ExecutionOutcome::RuntimeError("test case aborted".to_owned())
                });
                task_outcome(case, outcome)
            })
            .collect()
    }
}

fn task_outcome(case: &TestCase, outcome: ExecutionOutcome) -> TaskOutcome {
    TaskOutcome {
        task: case.task.clone(),
        outcome,
        points: case.points,
    }
}

/// Spawn `artifact`, feed it `input`, and wait at most `limit`
///
/// The budget covers both process exit and the close of its output pipes,
/// so output held open by a background child is still captured in full.
/// On expiry the whole process group is killed and reaped before
/// returning; nothing it printed is kept.
async fn run_process(
    artifact: &Path,
    working_dir: &Path,
    input: Vec<u8>,
    limit: Duration,
) -> Result<RunStatus, ExecuteError> {
    let mut std_command = std::process::Command::new(artifact);
    std_command
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group, so a timeout can take down background children
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_command.process_group(0);
    }
    let mut command = Command::from(std_command);
    command.kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ExecuteError::Spawn {
        path: artifact.to_path_buf(),
        source,
    })?;

    let pid = child.id();
    debug!(?pid, "spawned artifact");

    let writer = child.stdin.take().map(|mut stdin| {
        tokio::spawn(async move {
            // The program may exit without reading its input
            if let Err(e) = stdin.write_all(&input).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                debug!(error = %e, "failed to write input");
            }
        })
    });
    let mut stdout = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
    let mut stderr = child.stderr.take().map(|err| tokio::spawn(read_all(err)));

    let finished = tokio::time::timeout(limit, async {
        let status = child.wait().await?;
        let stdout = collect(stdout.as_mut()).await;
        let stderr = collect(stderr.as_mut()).await;
        Ok::<_, std::io::Error>((status, stdout, stderr))
    })
    .await;

    if let Some(writer) = writer {
        writer.abort();
    }

    match finished {
        Ok(result) => {
            let (status, stdout, stderr) = result?;
            Ok(RunStatus::Exited {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            kill_group(pid);
            if let Err(e) = child.kill().await {
                debug!(error = %e, "process already gone");
            }
            for task in [stdout, stderr].into_iter().flatten() {
                task.abort();
            }
            debug!(?limit, "process timed out and was killed");
            Ok(RunStatus::TimedOut)
        }
    }
}

async fn read_all<R: AsyncReadExt + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "output pipe closed with error");
    }
    buf
}

/// Wait for a pipe reader to hit end of file
async fn collect(task: Option<&mut JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Kill every process in the group led by `pid`
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        warn!(pid, error = %e, "failed to kill process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn termination_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Keep at most `limit` characters of `text`
fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
