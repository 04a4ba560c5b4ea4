//! CLI output formatting.
//!
//! Every function here is either a pure `format_*` (returns `Vec<String>`,
//! no I/O) or a thin `print_*` wrapper writing those lines to stdout.
//! Diagnostics go through `tracing` to stderr; this module is only for what
//! the user asked to see.
//!
//! # Progress
//!
//! ```text
//! [3/8] a_800.jpg
//! [4/8] FAILED a_800.webp: converter exited with status 1
//! ```
//!
//! # Summary
//!
//! ```text
//! Converted 7 of 8 jobs for 2 sources, 1 up to date
//! Fragments
//!     html/a.embed.html (1 variant)
//!     html/b.embed.html (2 variants)
//! Failed jobs
//!     a.png 800px q25 webp: converter exited with status 1 (exit status 1)
//! Key collisions
//!     photo: photo.jpg, photo.png
//! ```
//!
//! # Plan (`check` / `--dry-run`)
//!
//! ```text
//! Stale (2)
//!     a.png
//!     b.png
//! Up to date (1)
//!     c.png
//! 8 jobs planned
//! ```

use crate::executor::JobEvent;
use crate::naming;
use crate::pipeline::RunReport;
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Display `path` relative to `base` when it lives under it.
fn display_rel(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Format one progress event as display lines.
pub fn format_job_event(event: &JobEvent) -> Vec<String> {
    match event {
        JobEvent::Converted {
            done,
            total,
            output,
        } => vec![format!("[{done}/{total}] {}", file_name(output))],
        JobEvent::Failed {
            done,
            total,
            output,
            error,
        } => vec![format!("[{done}/{total}] FAILED {}: {error}", file_name(output))],
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Format the staleness decision and planned job count of a run.
pub fn format_plan(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    let wd = report.working_dir.as_path();

    lines.push(format!("Stale ({})", report.stale.len()));
    for path in &report.stale {
        lines.push(format!("{}{}", indent(1), display_rel(path, wd)));
    }
    lines.push(format!("Up to date ({})", report.fresh.len()));
    for path in &report.fresh {
        lines.push(format!("{}{}", indent(1), display_rel(path, wd)));
    }
    if !report.skipped.is_empty() {
        lines.push(format!("Skipped ({})", report.skipped.len()));
        for path in &report.skipped {
            lines.push(format!("{}{}", indent(1), display_rel(path, wd)));
        }
    }
    lines.extend(format_collisions(report));
    lines.push(format!("{} planned", plural(report.jobs_total(), "job")));
    lines
}

pub fn print_plan(report: &RunReport) {
    for line in format_plan(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Summary
// ============================================================================

fn format_collisions(report: &RunReport) -> Vec<String> {
    if report.collisions.is_empty() {
        return Vec::new();
    }
    let wd = report.working_dir.as_path();
    let mut lines = vec!["Key collisions".to_string()];
    for collision in &report.collisions {
        let files: Vec<String> = collision
            .paths
            .iter()
            .map(|p| display_rel(p, wd))
            .collect();
        lines.push(format!("{}{}: {}", indent(1), collision.key, files.join(", ")));
    }
    lines
}

/// Format the end-of-run summary: counts, fragments, and every problem.
///
/// Failed jobs list source, spec, format and the converter's exit status so
/// the user can rerun or fix exactly those.
pub fn format_run_summary(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    let wd = report.working_dir.as_path();

    lines.push(format!(
        "Converted {} of {} for {}, {} up to date",
        report.converted,
        plural(report.jobs_total(), "job"),
        plural(report.stale.len(), "source"),
        report.fresh.len()
    ));

    if !report.fragments.is_empty() {
        lines.push("Fragments".to_string());
        for entry in &report.manifest.entries {
            let path = naming::fragment_path(&report.fragment_dir, entry.source.key());
            if !report.fragments.contains(&path) {
                continue;
            }
            lines.push(format!(
                "{}{} ({})",
                indent(1),
                display_rel(&path, wd),
                plural(entry.variants.len(), "variant")
            ));
        }
    }

    if !report.failures.is_empty() {
        lines.push("Failed jobs".to_string());
        for failure in &report.failures {
            let status = match failure.exit_code {
                Some(code) => format!(" (exit status {code})"),
                None => String::new(),
            };
            lines.push(format!(
                "{}{} {}px q{} {}: {}{}",
                indent(1),
                display_rel(&failure.source, wd),
                failure.max_dimension,
                (failure.quality * 100.0).round() as u32,
                failure.format,
                failure.error,
                status
            ));
        }
    }

    if !report.removed_fragments.is_empty() {
        lines.push("Removed fragments (no variant left)".to_string());
        for path in &report.removed_fragments {
            lines.push(format!("{}{}", indent(1), display_rel(path, wd)));
        }
    }

    lines.extend(format_collisions(report));

    if !report.fragment_failures.is_empty() {
        lines.push("Fragment errors".to_string());
        for failure in &report.fragment_failures {
            lines.push(format!(
                "{}{}: {}",
                indent(1),
                display_rel(&failure.source, wd),
                failure.error
            ));
        }
    }
    lines
}

pub fn print_run_summary(report: &RunReport) {
    for line in format_run_summary(report) {
        println!("{}", line);
    }
}
