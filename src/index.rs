//! Output index and staleness resolution for incremental builds.
//!
//! The output directory is scanned **once** per run. For every derivative
//! found there whose size is still on the configured ladder, the index
//! records the oldest modification time per source key:
//!
//! ```text
//! out/dawn_100.jpg    12:00 ┐
//! out/dawn_100.webp   12:01 ├─ "dawn" → 12:00
//! out/dawn_800.jpg    12:05 ┘
//! ```
//!
//! Keeping the minimum means a source counts as fresh only if *every*
//! existing derivative is newer than it. A key with no entry has never been
//! built and is always stale. Files left behind by sizes removed from the
//! ladder are not indexed, so they never hold a source stale.
//!
//! [`is_stale`] is a pure function over the index and a timestamp so it can
//! be exercised without touching the filesystem.

use crate::naming;
use crate::types::{ConversionJob, DerivativeSpec, SourceFile};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot list output directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Oldest derivative timestamp per source key, plus the set of files seen.
#[derive(Debug, Clone, Default)]
pub struct OutputIndex {
    oldest: HashMap<String, SystemTime>,
    files: HashSet<PathBuf>,
}

impl OutputIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record one output file, keeping the minimum timestamp per key.
    /// Files not named like a derivative are ignored.
    pub fn record(&mut self, path: PathBuf, modified: SystemTime) {
        let Some(name) = naming::parse_derivative(&path) else {
            return;
        };
        self.oldest
            .entry(name.key)
            .and_modify(|t| *t = (*t).min(modified))
            .or_insert(modified);
        self.files.insert(path);
    }

    /// Oldest modification time among derivatives of `key`.
    pub fn oldest(&self, key: &str) -> Option<SystemTime> {
        self.oldest.get(key).copied()
    }

    /// Whether a file at exactly `path` existed when the index was built.
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.oldest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oldest.is_empty()
    }
}

/// Scan `dir` (non-recursively) into an [`OutputIndex`], keeping only
/// derivatives whose size appears in `ladder`.
///
/// A missing directory yields an empty index: nothing has been built yet.
pub fn build_index(dir: &Path, ladder: &[DerivativeSpec]) -> Result<OutputIndex, IndexError> {
    let mut index = OutputIndex::empty();
    if !dir.exists() {
        debug!(dir = %dir.display(), "output directory missing, starting from scratch");
        return Ok(index);
    }

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let on_ladder = naming::parse_derivative(entry.path())
            .is_some_and(|name| ladder.iter().any(|s| s.max_dimension == name.max_dimension));
        if !on_ladder {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        index.record(entry.into_path(), modified);
    }

    debug!(dir = %dir.display(), keys = index.len(), "built output index");
    Ok(index)
}

/// Whether a source with logical `key` modified at `source_modified` needs
/// rebuilding.
///
/// Stale when there is no index entry, or when the source is strictly newer
/// than the oldest derivative. Equal timestamps count as fresh.
pub fn is_stale(key: &str, source_modified: SystemTime, index: &OutputIndex) -> bool {
    match index.oldest(key) {
        Some(oldest_output) => source_modified > oldest_output,
        None => true,
    }
}

/// Whether every output a job list would write already exists.
///
/// Catches ladders extended since the last run: the existing derivatives may
/// all be newer than the source while a newly configured size is missing.
pub fn outputs_complete(jobs: &[ConversionJob], index: &OutputIndex) -> bool {
    jobs.iter().all(|job| index.contains(&job.output))
}

/// Read the source's modification time and apply [`is_stale`].
pub fn source_is_stale(source: &SourceFile, index: &OutputIndex) -> std::io::Result<bool> {
    let modified = std::fs::metadata(source.path())?.modified()?;
    Ok(is_stale(source.key(), modified, index))
}
