//! Bounded parallel execution of conversion jobs.
//!
//! All jobs of all stale sources go into one shared queue served by a
//! dedicated [rayon](https://docs.rs/rayon) pool of exactly `parallelism`
//! threads. Each job is its own stealable unit, so a source with a long
//! ladder cannot starve the others.
//!
//! [`execute_all`] is a barrier: it returns only once every job has finished
//! (or been cancelled). Fragments are written from complete result sets
//! only, never from partial ones.
//!
//! Outcomes come back in job-generation order whatever the completion
//! order, and each one carries its job, so regrouping downstream does not
//! depend on scheduling.
//!
//! A failed job never aborts its siblings. With `fail_fast` the first
//! failure cancels the shared [`CancelToken`], and jobs that have not started
//! yet are recorded as [`ConvertError::Cancelled`].

use crate::convert::{ConvertError, Converter};
use crate::types::ConversionJob;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("parallelism must be at least 1")]
    ZeroParallelism,
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Run-level cancellation flag shared by every worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notification, sent as each job finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Converted {
        /// 1-based completion counter.
        done: usize,
        total: usize,
        output: PathBuf,
    },
    Failed {
        done: usize,
        total: usize,
        output: PathBuf,
        error: String,
    },
}

/// A finished job and what happened to it.
#[derive(Debug)]
pub struct JobOutcome {
    pub job: ConversionJob,
    pub result: Result<(), ConvertError>,
}

/// Knobs for one [`execute_all`] call.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub parallelism: usize,
    pub fail_fast: bool,
    pub cancel: CancelToken,
    pub events: Option<Sender<JobEvent>>,
}

impl ExecuteOptions {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism,
            fail_fast: false,
            cancel: CancelToken::new(),
            events: None,
        }
    }
}

/// Run every job on a pool of `options.parallelism` threads and wait for all
/// of them.
pub fn execute_all(
    jobs: Vec<ConversionJob>,
    converter: &impl Converter,
    options: &ExecuteOptions,
) -> Result<Vec<JobOutcome>, ExecutorError> {
    if options.parallelism == 0 {
        return Err(ExecutorError::ZeroParallelism);
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.parallelism)
        .thread_name(|i| format!("convert-{i}"))
        .build()?;

    let total = jobs.len();
    let done = AtomicUsize::new(0);
    debug!(jobs = total, workers = options.parallelism, "dispatching jobs");

    let outcomes = pool.install(|| {
        jobs.into_par_iter()
            .with_max_len(1)
            .map(|job| {
                let result = if options.cancel.is_cancelled() {
                    Err(ConvertError::Cancelled)
                } else {
                    converter.convert(&job, &options.cancel)
                };
                let done = done.fetch_add(1, Ordering::SeqCst) + 1;
                report(&job, &result, done, total, options);
                JobOutcome { job, result }
            })
            .collect::<Vec<_>>()
    });

    Ok(outcomes)
}

fn report(
    job: &ConversionJob,
    result: &Result<(), ConvertError>,
    done: usize,
    total: usize,
    options: &ExecuteOptions,
) {
    let event = match result {
        Ok(()) => JobEvent::Converted {
            done,
            total,
            output: job.output.clone(),
        },
        Err(error) => {
            if !matches!(error, ConvertError::Cancelled) {
                warn!(
                    source = %job.source.path().display(),
                    size = job.spec.max_dimension,
                    format = %job.format,
                    %error,
                    "conversion failed"
                );
                if options.fail_fast {
                    options.cancel.cancel();
                }
            }
            JobEvent::Failed {
                done,
                total,
                output: job.output.clone(),
                error: error.to_string(),
            }
        }
    };
    if let Some(tx) = &options.events {
        // A dropped receiver only loses progress lines.
        let _ = tx.send(event);
    }
}
