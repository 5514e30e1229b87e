//! Configuration file loading for autograde
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};
use regex::Regex;

use crate::config::{Config, ConfigError, has_placeholder};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.problems == 0 {
            return Err(ConfigError::Invalid("problems must be at least 1".into()));
        }
        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "timeout must be positive, got {}",
                self.timeout
            )));
        }
        if !(self.toolchain.timeout.is_finite() && self.toolchain.timeout > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "toolchain timeout must be positive, got {}",
                self.toolchain.timeout
            )));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::Invalid("parallelism must be at least 1".into()));
        }
        if self.toolchain.command.is_empty() {
            return Err(ConfigError::Invalid("toolchain has empty command".into()));
        }
        if let Some(ref extract) = self.extract
            && extract.command.is_empty()
        {
            return Err(ConfigError::Invalid("extract has empty command".into()));
        }
        if !has_placeholder(&self.source_pattern, "problem") {
            return Err(ConfigError::Invalid(format!(
                "source pattern '{}' does not reference {{problem}}",
                self.source_pattern
            )));
        }
        if !has_placeholder(&self.artifact_pattern, "problem") {
            return Err(ConfigError::Invalid(format!(
                "artifact pattern '{}' does not reference {{problem}}",
                self.artifact_pattern
            )));
        }

        // Patterns are compiled again by their consumers; this only surfaces errors early
        let patterns = self
            .validator
            .deny
            .iter()
            .chain(self.preprocess.rewrites.iter().map(|r| &r.pattern));
        for pattern in patterns {
            Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        Ok(())
    }
}
