//! Job generation: expand stale sources into conversion jobs.
//!
//! Expansion is plain data. For each source, every ladder entry is paired
//! with every [`Format`], in ladder order then format order:
//!
//! ```text
//! dawn.png × [(300, 0.2), (800, 0.3)]
//!   → dawn_300.jpg  dawn_300.webp  dawn_800.jpg  dawn_800.webp
//! ```
//!
//! No I/O happens here, so the executor never needs to know why a job
//! exists and tests can inspect the full plan.

use crate::naming;
use crate::types::{ConversionJob, DerivativeSpec, Format, SourceFile};
use std::path::Path;

/// All jobs for one source: `2 × specs.len()` entries.
pub fn generate_jobs(
    source: &SourceFile,
    out_dir: &Path,
    specs: &[DerivativeSpec],
) -> Vec<ConversionJob> {
    specs
        .iter()
        .enumerate()
        .flat_map(|(spec_index, spec)| {
            Format::ALL.into_iter().map(move |format| ConversionJob {
                source: source.clone(),
                spec_index,
                spec: *spec,
                format,
                output: naming::derivative_path(out_dir, source.key(), spec.max_dimension, format),
            })
        })
        .collect()
}

/// Jobs for every source, concatenated in source order.
pub fn plan(sources: &[SourceFile], out_dir: &Path, specs: &[DerivativeSpec]) -> Vec<ConversionJob> {
    sources
        .iter()
        .flat_map(|source| generate_jobs(source, out_dir, specs))
        .collect()
}
