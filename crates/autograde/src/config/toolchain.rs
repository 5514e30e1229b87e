use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::pattern::expand_pattern;

/// Default wall-clock budget for one compiler invocation, in seconds
pub const DEFAULT_COMPILE_TIMEOUT: f64 = 60.0;

/// Configuration for the compiler invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Wall-clock limit per invocation in seconds
    #[serde(default = "default_compile_timeout")]
    pub timeout: f64,
}

impl ToolchainConfig {
    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], source: &str, output: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| expand_pattern(arg, &[("source", source), ("output", output)]))
            .collect()
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            env: HashMap::new(),
            timeout: DEFAULT_COMPILE_TIMEOUT,
        }
    }
}

fn default_command() -> Vec<String> {
    ["g++", "-std=c++17", "-O2", "-Wall", "{source}", "-o", "{output}"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_compile_timeout() -> f64 {
    DEFAULT_COMPILE_TIMEOUT
}

/// Command used to unpack a submission archive inside the work directory
/// Placeholders: {archive}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub command: Vec<String>,
}

impl ExtractConfig {
    pub fn expand_command(&self, archive: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| expand_pattern(arg, &[("archive", archive)]))
            .collect()
    }
}
