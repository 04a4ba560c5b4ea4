//! Regroup executor outcomes into per-source manifests.
//!
//! The executor hands back a flat list. Grouping happens in two steps:
//!
//! 1. [`group_by_source`]: a plain grouping, first-seen order per source,
//!    nothing lost and nothing duplicated.
//! 2. Per source, outcomes are paired by `spec_index` (primary + secondary
//!    format) and sorted by it, so the manifest follows the configured ladder
//!    no matter which worker finished first.
//!
//! A variant enters the manifest only if both of its formats converted.
//! Failures are returned separately. A source left with no variants gets no
//! manifest entry, and therefore no fragment.

use crate::convert::ConvertError;
use crate::executor::JobOutcome;
use crate::types::{
    ConversionJob, DerivativeResult, Dimensions, Format, Manifest, ManifestEntry, SourceFile,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// A job that did not produce its output.
#[derive(Debug)]
pub struct JobFailure {
    pub job: ConversionJob,
    pub error: ConvertError,
}

/// Manifest plus everything that went wrong building it.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub manifest: Manifest,
    pub failures: Vec<JobFailure>,
}

/// Group `(source, item)` pairs by source, keeping first-seen order of
/// sources and of items within a source.
pub fn group_by_source<T>(
    pairs: impl IntoIterator<Item = (SourceFile, T)>,
) -> Vec<(SourceFile, Vec<T>)> {
    let mut slots: HashMap<SourceFile, usize> = HashMap::new();
    let mut groups: Vec<(SourceFile, Vec<T>)> = Vec::new();
    for (source, item) in pairs {
        match slots.get(&source) {
            Some(&slot) => groups[slot].1.push(item),
            None => {
                slots.insert(source.clone(), groups.len());
                groups.push((source, vec![item]));
            }
        }
    }
    groups
}

#[derive(Default)]
struct Pair {
    primary: Option<PathBuf>,
    secondary: Option<PathBuf>,
    max_dimension: u32,
}

/// Build the manifest from executor outcomes.
///
/// `measure` reads dimensions from a primary-format output; production passes
/// [`crate::metadata::extract_dimensions`].
pub fn aggregate(
    outcomes: Vec<JobOutcome>,
    measure: impl Fn(&Path) -> Option<Dimensions>,
) -> Aggregation {
    let mut failures = Vec::new();
    let succeeded = outcomes.into_iter().filter_map(|outcome| match outcome.result {
        Ok(()) => Some((outcome.job.source.clone(), outcome.job)),
        Err(error) => {
            failures.push(JobFailure {
                job: outcome.job,
                error,
            });
            None
        }
    });
    let groups = group_by_source(succeeded);

    let mut entries = Vec::new();
    for (source, jobs) in groups {
        let mut pairs: BTreeMap<usize, Pair> = BTreeMap::new();
        for job in jobs {
            let pair = pairs.entry(job.spec_index).or_default();
            pair.max_dimension = job.spec.max_dimension;
            match job.format {
                Format::Jpeg => pair.primary = Some(job.output),
                Format::WebP => pair.secondary = Some(job.output),
            }
        }

        let variants: Vec<DerivativeResult> = pairs
            .into_iter()
            .filter_map(|(spec_index, pair)| {
                let primary = pair.primary?;
                let secondary = pair.secondary?;
                Some(DerivativeResult {
                    spec_index,
                    max_dimension: pair.max_dimension,
                    dimensions: measure(&primary),
                    primary,
                    secondary,
                })
            })
            .collect();

        if !variants.is_empty() {
            entries.push(ManifestEntry { source, variants });
        }
    }

    Aggregation {
        manifest: Manifest { entries },
        failures,
    }
}
