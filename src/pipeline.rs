//! One incremental run, end to end.
//!
//! ```text
//! discover(working_dir) ─┐
//! build_index(out/) ─────┴→ stale sources → plan jobs → execute_all (barrier)
//!                                                        │
//!                    html/<key>.embed.html ← emit ← aggregate
//! ```
//!
//! Run-level failures (unreadable working directory, bad output directory)
//! abort with a [`PipelineError`]. Job-level failures are collected into the
//! [`RunReport`] and never stop sibling jobs.
//!
//! A source is rebuilt when it is newer than its oldest derivative, when it
//! has no derivatives at all, or when one of the derivatives the current
//! ladder expects is missing. Only sources converted in this run get a
//! manifest entry and a fragment. A rebuilt source left without any variant
//! loses its old fragment.

use crate::aggregate::{self, JobFailure};
use crate::config::PipelineConfig;
use crate::convert::Converter;
use crate::executor::{self, CancelToken, ExecuteOptions, ExecutorError, JobEvent};
use crate::fragment;
use crate::index::{self, IndexError, OutputIndex};
use crate::jobs;
use crate::metadata;
use crate::scan::{self, KeyCollision, ScanError};
use crate::types::{ConversionJob, Format, Manifest, SourceFile};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Cannot index output directory: {0}")]
    Index(#[from] IndexError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("Cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-run switches that are not part of the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Ignore the output index and rebuild every candidate.
    pub force: bool,
    /// Plan only: report stale sources and jobs, convert nothing.
    pub dry_run: bool,
    /// Cancel the remaining jobs after the first failure.
    pub fail_fast: bool,
    pub cancel: CancelToken,
    pub events: Option<Sender<JobEvent>>,
}

/// A failed job, in a form that can be printed or written as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedJob {
    pub source: PathBuf,
    pub max_dimension: u32,
    pub quality: f32,
    pub format: Format,
    pub output: PathBuf,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl From<&JobFailure> for FailedJob {
    fn from(failure: &JobFailure) -> Self {
        Self {
            source: failure.job.source.path().to_path_buf(),
            max_dimension: failure.job.spec.max_dimension,
            quality: failure.job.spec.quality,
            format: failure.job.format,
            output: failure.job.output.clone(),
            error: failure.error.to_string(),
            exit_code: failure.error.exit_code(),
        }
    }
}

/// A fragment that could not be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentFailure {
    pub source: PathBuf,
    pub error: String,
}

/// Everything a run did, for the summary and the optional JSON report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub working_dir: PathBuf,
    pub output_dir: PathBuf,
    pub fragment_dir: PathBuf,
    pub dry_run: bool,
    /// Sources selected for conversion, in discovery order.
    pub stale: Vec<PathBuf>,
    /// Sources skipped because their derivatives are up to date.
    pub fresh: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub collisions: Vec<KeyCollision>,
    /// Outputs of every planned job, in generation order.
    pub planned: Vec<PathBuf>,
    pub converted: usize,
    pub failures: Vec<FailedJob>,
    pub manifest: Manifest,
    pub fragments: Vec<PathBuf>,
    /// Fragments deleted because their source was rebuilt without any
    /// surviving variant.
    pub removed_fragments: Vec<PathBuf>,
    pub fragment_failures: Vec<FragmentFailure>,
}

impl RunReport {
    pub fn jobs_total(&self) -> usize {
        self.planned.len()
    }

    /// Whether anything needs the user's attention.
    pub fn has_problems(&self) -> bool {
        !self.failures.is_empty()
            || !self.collisions.is_empty()
            || !self.fragment_failures.is_empty()
    }

    /// Sources with at least one failed job, deduplicated, in report order.
    pub fn failed_sources(&self) -> Vec<&Path> {
        let mut seen: Vec<&Path> = Vec::new();
        for failure in &self.failures {
            if !seen.contains(&failure.source.as_path()) {
                seen.push(&failure.source);
            }
        }
        seen
    }
}

/// Decide which sources need rebuilding.
///
/// Returns `(stale, fresh)`, both in input order.
pub fn resolve_stale(
    sources: Vec<SourceFile>,
    index: &OutputIndex,
    out_dir: &Path,
    config: &PipelineConfig,
    force: bool,
) -> Result<(Vec<SourceFile>, Vec<SourceFile>), PipelineError> {
    let mut stale = Vec::new();
    let mut fresh = Vec::new();
    for source in sources {
        let rebuild = force
            || index::source_is_stale(&source, index)?
            || !index::outputs_complete(
                &jobs::generate_jobs(&source, out_dir, &config.variants),
                index,
            );
        debug!(source = %source.path().display(), rebuild, "staleness resolved");
        if rebuild {
            stale.push(source);
        } else {
            fresh.push(source);
        }
    }
    Ok((stale, fresh))
}

fn create_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).map_err(|source| PipelineError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Run the pipeline once over `working_dir`.
pub fn run(
    working_dir: &Path,
    config: &PipelineConfig,
    converter: &impl Converter,
    options: RunOptions,
) -> Result<RunReport, PipelineError> {
    let working_dir = std::path::absolute(working_dir)?;
    let output_dir = config.paths.output_dir(&working_dir);
    let fragment_dir = config.paths.fragment_dir(&working_dir);

    let discovery = scan::discover(&working_dir, &config.scan.skip_extensions)?;
    if !options.dry_run {
        create_dir(&output_dir)?;
        create_dir(&fragment_dir)?;
    }

    let index = if options.force {
        OutputIndex::empty()
    } else {
        index::build_index(&output_dir, &config.variants)?
    };
    let (stale, fresh) = resolve_stale(
        discovery.sources,
        &index,
        &output_dir,
        config,
        options.force,
    )?;
    info!(
        stale = stale.len(),
        fresh = fresh.len(),
        collisions = discovery.collisions.len(),
        "resolved sources"
    );

    let planned: Vec<ConversionJob> = jobs::plan(&stale, &output_dir, &config.variants);
    let mut report = RunReport {
        working_dir: working_dir.clone(),
        output_dir,
        fragment_dir: fragment_dir.clone(),
        dry_run: options.dry_run,
        stale: stale.iter().map(|s| s.path().to_path_buf()).collect(),
        fresh: fresh.iter().map(|s| s.path().to_path_buf()).collect(),
        skipped: discovery.skipped,
        collisions: discovery.collisions,
        planned: planned.iter().map(|j| j.output.clone()).collect(),
        ..Default::default()
    };
    if options.dry_run || planned.is_empty() {
        return Ok(report);
    }

    let execute = ExecuteOptions {
        parallelism: config.processing.parallelism,
        fail_fast: options.fail_fast,
        cancel: options.cancel,
        events: options.events,
    };
    let outcomes = executor::execute_all(planned, converter, &execute)?;
    drop(execute);

    let aggregation = aggregate::aggregate(outcomes, metadata::extract_dimensions);
    report.failures = aggregation.failures.iter().map(FailedJob::from).collect();
    report.converted = report.jobs_total() - report.failures.len();

    for entry in &aggregation.manifest.entries {
        match fragment::emit(entry, &fragment_dir, &config.fragments) {
            Ok(path) => report.fragments.push(path),
            Err(e) => report.fragment_failures.push(FragmentFailure {
                source: entry.source.path().to_path_buf(),
                error: e.to_string(),
            }),
        }
    }
    for source in &stale {
        if aggregation.manifest.get(source).is_some() {
            continue;
        }
        match fragment::remove_stale(&fragment_dir, source.key()) {
            Ok(Some(path)) => {
                warn!(
                    source = %source.path().display(),
                    "no variant survived, removed old fragment"
                );
                report.removed_fragments.push(path);
            }
            Ok(None) => {}
            Err(e) => report.fragment_failures.push(FragmentFailure {
                source: source.path().to_path_buf(),
                error: e.to_string(),
            }),
        }
    }
    report.manifest = aggregation.manifest;

    info!(
        converted = report.converted,
        failed = report.failures.len(),
        fragments = report.fragments.len(),
        "run finished"
    );
    Ok(report)
}
