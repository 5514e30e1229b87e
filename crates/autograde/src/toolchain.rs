//! Compiler toolchain abstraction
//!
//! The compilation stage only needs "turn this source into that artifact".
//! [`Toolchain`] captures that; [`CommandToolchain`] implements it by running
//! an external compiler described in the configuration.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::{Config, ToolchainConfig};

/// Errors that occur while invoking the toolchain
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("toolchain command is empty")]
    EmptyCommand,

    #[error("failed to spawn compiler '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compilation timed out after {0:?}")]
    Timeout(Duration),
}

/// One source to compile into one artifact
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub problem: u32,
    pub source: PathBuf,
    pub artifact: PathBuf,
    /// Directory the compiler runs in
    pub working_dir: PathBuf,
}

/// What the compiler reported
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    /// Exit code, `None` if the compiler was killed by a signal
    pub exit_code: Option<i32>,

    /// Combined stdout and stderr of the compiler
    pub output: String,
}

impl BuildOutput {
    /// Whether the compiler itself reported success
    ///
    /// The compilation stage does not rely on this alone; it probes for the
    /// artifact afterwards.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A compiler capable of building one artifact from one source
pub trait Toolchain: Send + Sync {
    fn build(
        &self,
        job: &BuildJob,
    ) -> impl Future<Output = Result<BuildOutput, ToolchainError>> + Send;
}

/// Toolchain running an external command template
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    command: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl CommandToolchain {
    pub fn new(config: &ToolchainConfig) -> Self {
        Self {
            command: config.command.clone(),
            env: config.env.clone(),
            timeout: Duration::from_secs_f64(config.timeout),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.toolchain)
    }

    /// The command line for a job after placeholder expansion
    pub fn command_line(&self, job: &BuildJob) -> Vec<String> {
        ToolchainConfig::expand_command(
            &self.command,
            &job.source.to_string_lossy(),
            &job.artifact.to_string_lossy(),
        )
    }
}

impl Toolchain for CommandToolchain {
    #[instrument(skip(self, job), fields(problem = job.problem))]
    async fn build(&self, job: &BuildJob) -> Result<BuildOutput, ToolchainError> {
        let args = self.command_line(job);
        let program = args.first().ok_or(ToolchainError::EmptyCommand)?;

        debug!(?args, "running compiler");

        let child = Command::new(program)
            .args(&args[1..])
            .envs(&self.env)
            .current_dir(&job.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| ToolchainError::Timeout(self.timeout))?
            .map_err(|source| ToolchainError::SpawnFailed {
                program: program.clone(),
                source,
            })?;

        // Combine stdout and stderr for compiler output
        let mut compiler_output = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !compiler_output.is_empty() && !stderr.is_empty() {
            compiler_output.push('\n');
        }
        compiler_output.push_str(&stderr);

        let result = BuildOutput {
            exit_code: output.status.code(),
            output: compiler_output,
        };

        debug!(
            success = result.success(),
            exit_code = ?result.exit_code,
            "compiler finished"
        );

        Ok(result)
    }
}
