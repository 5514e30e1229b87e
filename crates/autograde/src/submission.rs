//! Submission discovery and staging
//!
//! Submissions live in per-candidate directories under the assignments
//! directory. A directory belongs to a candidate when its name starts with
//! the candidate identifier, which lets the download tool append the
//! candidate's name to the folder. Staging copies (and optionally unpacks)
//! a submission into the work directory and lifts each expected source file
//! to the work directory root.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::config::{Config, ExtractConfig};
use crate::roster::Roster;
use crate::workdir::WorkDir;

/// Deepest directory level below the work directory searched for sources
const SOURCE_SEARCH_DEPTH: usize = 2;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("candidate '{candidate}' has more than one submission: {matches:?}")]
    DuplicateSubmission {
        candidate: String,
        matches: Vec<PathBuf>,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extract command is empty")]
    EmptyExtractCommand,

    #[error("failed to run extract command '{program}': {source}")]
    Extract {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extracting {0} timed out")]
    ExtractTimeout(PathBuf),

    #[error("staging task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SubmissionError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| SubmissionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Discovery result for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub candidate: String,
    /// `None` when the candidate did not submit
    pub submission: Option<PathBuf>,
}

/// Find the submission named `archive_name` for `candidate`
///
/// Returns `Ok(None)` when nothing matches and
/// [`SubmissionError::DuplicateSubmission`] when more than one entry does.
#[instrument(skip(assignments_dir))]
pub async fn discover(
    assignments_dir: &Path,
    candidate: &str,
    archive_name: &str,
) -> Result<Option<PathBuf>, SubmissionError> {
    let mut entries = match tokio::fs::read_dir(assignments_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(?assignments_dir, "assignments directory does not exist");
            return Ok(None);
        }
        Err(e) => return Err(SubmissionError::io(assignments_dir)(e)),
    };

    let mut matches = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(SubmissionError::io(assignments_dir))?
    {
        let owned = entry.file_name().to_string_lossy().starts_with(candidate);
        if !owned || !entry.path().is_dir() {
            continue;
        }
        let candidate_path = entry.path().join(archive_name);
        if tokio::fs::try_exists(&candidate_path).await.unwrap_or(false) {
            matches.push(candidate_path);
        }
    }
    matches.sort();

    match matches.len() {
        0 => {
            debug!("no submission found");
            Ok(None)
        }
        1 => Ok(matches.pop()),
        _ => Err(SubmissionError::DuplicateSubmission {
            candidate: candidate.to_owned(),
            matches,
        }),
    }
}

/// Discover submissions for the whole roster before anything is graded
///
/// Stops at the first duplicate.
pub async fn discover_all(
    config: &Config,
    roster: &Roster,
) -> Result<Vec<Discovered>, SubmissionError> {
    let mut discovered = Vec::with_capacity(roster.len());
    for candidate in roster.iter() {
        let submission = discover(
            &config.assignments_dir,
            candidate,
            &config.archive_name(candidate),
        )
        .await?;
        discovered.push(Discovered {
            candidate: candidate.to_owned(),
            submission,
        });
    }
    Ok(discovered)
}

/// Bring `submission` into `workdir` and lift every expected source to its root
///
/// Returns the number of problems whose source was found.
#[instrument(skip(config, workdir), fields(workdir = %workdir.path().display()))]
pub async fn stage(
    config: &Config,
    workdir: &WorkDir,
    candidate: &str,
    submission: &Path,
) -> Result<usize, SubmissionError> {
    match &config.extract {
        Some(extract) => {
            extract_archive(extract, config.compile_timeout(), workdir, submission).await?
        }
        None => {
            let from = submission.to_path_buf();
            let to = workdir.path().to_path_buf();
            tokio::task::spawn_blocking(move || copy_submission(&from, &to)).await??;
        }
    }

    let names: Vec<String> = config
        .problem_ids()
        .map(|problem| config.source_name(candidate, problem))
        .collect();
    let root = workdir.path().to_path_buf();
    let found = tokio::task::spawn_blocking(move || lift_sources(&root, &names)).await??;

    debug!(found, "submission staged");
    Ok(found)
}

/// Copy the archive into the work directory and unpack it there
async fn extract_archive(
    extract: &ExtractConfig,
    limit: std::time::Duration,
    workdir: &WorkDir,
    archive: &Path,
) -> Result<(), SubmissionError> {
    let file_name = archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| SubmissionError::Io {
            path: archive.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
        })?;
    let local = workdir.path().join(&file_name);
    tokio::fs::copy(archive, &local)
        .await
        .map_err(SubmissionError::io(archive))?;

    let args = extract.expand_command(&file_name);
    let program = args.first().ok_or(SubmissionError::EmptyExtractCommand)?;
    debug!(?args, "extracting submission");

    let output = Command::new(program)
        .args(&args[1..])
        .current_dir(workdir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(limit, output)
        .await
        .map_err(|_| SubmissionError::ExtractTimeout(archive.to_path_buf()))?
        .map_err(|source| SubmissionError::Extract {
            program: program.clone(),
            source,
        })?;

    // Archivers return non-zero for warnings; missing sources show up later
    if !output.status.success() {
        warn!(
            exit_code = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "extract command reported failure"
        );
    }
    Ok(())
}

/// Copy a submission directory's contents, or a single file, into `to`
fn copy_submission(from: &Path, to: &Path) -> Result<(), SubmissionError> {
    let metadata = std::fs::metadata(from).map_err(SubmissionError::io(from))?;
    if metadata.is_dir() {
        return copy_dir(from, to);
    }
    let name = from.file_name().unwrap_or(from.as_os_str());
    std::fs::copy(from, to.join(name)).map_err(SubmissionError::io(from))?;
    Ok(())
}

/// Recursive copy; symbolic links are skipped
fn copy_dir(from: &Path, to: &Path) -> Result<(), SubmissionError> {
    for entry in WalkDir::new(from).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(from, e))?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(SubmissionError::io(&target))?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target).map_err(SubmissionError::io(entry.path()))?;
        }
    }
    Ok(())
}

/// Find each of `names` at most [`SOURCE_SEARCH_DEPTH`] levels below `root`
/// and copy the first match to `root`
fn lift_sources(root: &Path, names: &[String]) -> Result<usize, SubmissionError> {
    let mut found = 0;
    for name in names {
        match find_file(root, name, SOURCE_SEARCH_DEPTH)? {
            Some(path) if path.parent() == Some(root) => found += 1,
            Some(path) => {
                std::fs::copy(&path, root.join(name)).map_err(SubmissionError::io(&path))?;
                debug!(?path, "lifted source to work directory root");
                found += 1;
            }
            None => debug!(name, "source not present in submission"),
        }
    }
    Ok(found)
}

/// Search for a regular file called `name` up to `max_depth` directories
/// below `root`
///
/// Shallower matches win; within a level, paths are compared by name.
fn find_file(root: &Path, name: &str, max_depth: usize) -> Result<Option<PathBuf>, SubmissionError> {
    let mut best: Option<(usize, PathBuf)> = None;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth + 1)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() || entry.file_name() != name {
            continue;
        }
        if best.as_ref().is_none_or(|(depth, _)| entry.depth() < *depth) {
            best = Some((entry.depth(), entry.into_path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

fn walk_error(root: &Path, error: walkdir::Error) -> SubmissionError {
    SubmissionError::Io {
        path: error.path().unwrap_or(root).to_path_buf(),
        source: error.into(),
    }
}
