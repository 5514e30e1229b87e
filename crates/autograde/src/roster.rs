//! Roster and score table
//!
//! Both are plain JSON documents maintained by the course staff: the roster
//! is an array of candidate identifiers, the score table maps each problem
//! to its tasks and their point values.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::config::ConfigError;
use crate::types::TestCase;

/// Ordered list of candidates to grade
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Roster(Vec<String>);

impl Roster {
    pub fn new(candidates: Vec<String>) -> Self {
        Self(candidates)
    }

    /// Roster holding one candidate
    pub fn single(candidate: impl Into<String>) -> Self {
        Self(vec![candidate.into()])
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let roster: Self = load_json(path)?;
        debug!(?path, candidates = roster.len(), "loaded roster");
        Ok(roster)
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Point values per problem and task
///
/// Task order is kept as written; reasons are reported in that order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ScoreTable(IndexMap<u32, IndexMap<String, f64>>);

impl ScoreTable {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let table: Self = load_json(path)?;
        debug!(?path, problems = table.0.len(), "loaded score table");
        Ok(table)
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Tasks of `problem` with their points, in table order
    pub fn tasks(&self, problem: u32) -> impl Iterator<Item = (&str, f64)> {
        self.0
            .get(&problem)
            .into_iter()
            .flat_map(|tasks| tasks.iter().map(|(task, points)| (task.as_str(), *points)))
    }

    /// Maximum score of `problem`
    pub fn max_score(&self, problem: u32) -> f64 {
        self.tasks(problem).map(|(_, points)| points).sum()
    }

    /// Test cases of `problem` with fixtures `<task>.in` / `<task>.out` under `testdata_dir`
    pub fn test_cases(&self, problem: u32, testdata_dir: &Path) -> Vec<TestCase> {
        self.tasks(problem)
            .map(|(task, points)| TestCase {
                problem,
                task: task.to_owned(),
                input: fixture(testdata_dir, task, "in"),
                expected: fixture(testdata_dir, task, "out"),
                points,
            })
            .collect()
    }
}

fn fixture(dir: &Path, task: &str, extension: &str) -> PathBuf {
    dir.join(format!("{task}.{extension}"))
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}
