//! Integration tests for autograde
//!
//! The pipeline is driven end to end with shell scripts standing in for
//! sources and a copy-and-chmod command standing in for the compiler, so no
//! real toolchain is needed. Unix only.
//!
//! Tests that need a real C++ compiler are marked `#[ignore]`. To include them:
//!    cargo test -p autograde -- --include-ignored

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use autograde::{Config, Roster, ScoreTable};
use tempfile::TempDir;

mod batch;
mod config_loading;
mod execution;
mod gating;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Fake compiler: refuses sources containing `SYNTAX ERROR`, otherwise the
/// source itself becomes the executable
const FAKE_COMPILER: &str = "if grep -q 'SYNTAX ERROR' '{source}'; then \
     echo 'error: syntax error' >&2; exit 1; fi; \
     cp '{source}' '{output}' && chmod +x '{output}'";

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

pub(crate) fn fixture_config(name: &str) -> PathBuf {
    PathBuf::from(format!("{FIXTURES_PATH}/configs/{name}"))
}

/// A throwaway course layout: assignments, test data, and a work directory
pub(crate) struct Course {
    root: TempDir,
    pub config: Config,
}

impl Course {
    pub fn new(problems: u32) -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.problems = problems;
        config.timeout = 5.0;
        config.work_dir = root.path().join("cache");
        config.testdata_dir = root.path().join("testdata");
        config.assignments_dir = root.path().join("assignments");
        config.archive_pattern = "{candidate}_hw_w{assignment:02}".to_owned();
        config.extract = None;
        config.toolchain.command = vec!["sh".into(), "-c".into(), FAKE_COMPILER.into()];
        config.toolchain.timeout = 10.0;
        config.validate().expect("test config should be valid");

        fs::create_dir_all(&config.testdata_dir).unwrap();
        fs::create_dir_all(&config.assignments_dir).unwrap();
        Self { root, config }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn work_dir(&self) -> &Path {
        &self.config.work_dir
    }

    /// Add a test case fixture pair
    pub fn task(&self, task: &str, input: &str, expected: &str) {
        let dir = &self.config.testdata_dir;
        fs::write(dir.join(format!("{task}.in")), input).unwrap();
        fs::write(dir.join(format!("{task}.out")), expected).unwrap();
    }

    /// Submission directory of `candidate` inside a folder named `candidate` + `suffix`
    pub fn submission_dir(&self, candidate: &str, suffix: &str) -> PathBuf {
        self.config
            .assignments_dir
            .join(format!("{candidate}{suffix}"))
            .join(self.config.archive_name(candidate))
    }

    /// Submit `files` (relative path, content) for `candidate`
    pub fn submit_files(&self, candidate: &str, suffix: &str, files: &[(&str, &str)]) {
        let dir = self.submission_dir(candidate, suffix);
        for (name, content) in files {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    /// Submit one fixture source per problem, `None` leaving the problem out
    pub fn submit(&self, candidate: &str, sources: &[Option<&str>]) {
        let files: Vec<(String, String)> = sources
            .iter()
            .enumerate()
            .filter_map(|(idx, fixture)| {
                fixture.map(|name| {
                    (
                        self.config.source_name(candidate, idx as u32 + 1),
                        fixture_source(name),
                    )
                })
            })
            .collect();
        let borrowed: Vec<(&str, &str)> = files
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_str()))
            .collect();
        self.submit_files(candidate, "", &borrowed);
    }
}

pub(crate) fn scores(json: &str) -> ScoreTable {
    ScoreTable::parse(json).expect("valid score table")
}

pub(crate) fn roster(ids: &[&str]) -> Roster {
    Roster::new(ids.iter().map(|id| (*id).to_owned()).collect())
}

/// Whether a process with this pid is still alive
pub(crate) fn process_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid.trim()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
