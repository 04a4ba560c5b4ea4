//! Source discovery.
//!
//! Lists the working directory (flat, non-recursive) and decides which
//! regular files are candidates for conversion. The rules, in order:
//!
//! 1. Only regular files; the output and fragment directories living inside
//!    the working directory are skipped naturally.
//! 2. Hidden files (`.DS_Store`, editor swap files) are ignored.
//! 3. Files whose extension is in the configured skip list (archives,
//!    packages, generated HTML, the config file itself) are ignored.
//! 4. Names that are not valid UTF-8 are skipped with a warning: their
//!    logical key could not be told apart from other lossily decoded names.
//!
//! Two candidates that collapse to the same logical key (`dawn.png` and
//! `dawn.jpg`) would silently share derivatives and a fragment. Both are
//! removed from the candidate list and reported as a [`KeyCollision`].

use crate::types::SourceFile;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Input directory not found: {0}")]
    NotFound(PathBuf),
    #[error("Input path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Cannot list input directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Several sources sharing one logical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCollision {
    pub key: String,
    pub paths: Vec<PathBuf>,
}

/// Result of listing the working directory.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Candidates with unique keys, sorted by path.
    pub sources: Vec<SourceFile>,
    /// Files rejected by the skip predicate.
    pub skipped: Vec<PathBuf>,
    pub collisions: Vec<KeyCollision>,
}

/// Whether `path` may be converted, judged on its name alone.
pub fn is_candidate(path: &Path, skip_extensions: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') {
        return false;
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    !skip_extensions.iter().any(|s| s.eq_ignore_ascii_case(&ext))
}

/// List candidate sources in `dir`.
///
/// Fails if `dir` does not exist or cannot be listed; this aborts the run
/// before any work starts.
pub fn discover(dir: &Path, skip_extensions: &[String]) -> Result<Discovery, ScanError> {
    if !dir.exists() {
        return Err(ScanError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir.to_path_buf()));
    }

    let mut candidates = Vec::new();
    let mut skipped = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if is_candidate(&path, skip_extensions) {
            candidates.push(path);
        } else if path.file_name().and_then(|n| n.to_str()).is_none() {
            warn!(path = %path.display(), "file name is not valid UTF-8, skipping");
            skipped.push(path);
        } else {
            debug!(path = %path.display(), "skipping non-image file");
            skipped.push(path);
        }
    }

    let (sources, collisions) = split_collisions(candidates);
    for collision in &collisions {
        warn!(
            key = %collision.key,
            files = ?collision.paths,
            "sources share a logical key; excluded from this run"
        );
    }

    Ok(Discovery {
        sources,
        skipped,
        collisions,
    })
}

/// Partition paths into uniquely-keyed sources and key collisions.
fn split_collisions(paths: Vec<PathBuf>) -> (Vec<SourceFile>, Vec<KeyCollision>) {
    let mut by_key: BTreeMap<String, Vec<SourceFile>> = BTreeMap::new();
    for path in paths {
        let source = SourceFile::new(path);
        by_key.entry(source.key().to_string()).or_default().push(source);
    }

    let mut sources = Vec::new();
    let mut collisions = Vec::new();
    for (key, mut group) in by_key {
        if group.len() == 1 {
            sources.append(&mut group);
        } else {
            collisions.push(KeyCollision {
                key,
                paths: group.into_iter().map(|s| s.path().to_path_buf()).collect(),
            });
        }
    }
    sources.sort_by(|a, b| a.path().cmp(b.path()));
    (sources, collisions)
}
