//! Shared test utilities.
//!
//! - [`MockConverter`]: a [`Converter`] that writes small real JPEGs instead
//!   of shelling out, records every call, and fails or corrupts on demand.
//! - [`touch_at`] / [`at`]: create files with fixed modification times so
//!   staleness tests don't depend on the wall clock.

use crate::convert::{ConvertError, Converter};
use crate::executor::CancelToken;
use crate::types::{ConversionJob, Format};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// =========================================================================
// Timestamps
// =========================================================================

/// `UNIX_EPOCH + secs`.
pub fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// Create (or truncate) `path` and set its modification time.
pub fn touch_at(path: &Path, modified: SystemTime) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(path).unwrap();
    file.set_modified(modified).unwrap();
}

/// Set the modification time of an existing file.
pub fn set_mtime(path: &Path, modified: SystemTime) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(modified).unwrap();
}

pub fn default_skip_extensions() -> Vec<String> {
    crate::config::ScanConfig::default().skip_extensions
}

// =========================================================================
// MockConverter
// =========================================================================

/// Converter that writes `max_dimension × (max_dimension * 3 / 4)` JPEGs for
/// the primary format and placeholder bytes for the secondary one.
#[derive(Default)]
pub struct MockConverter {
    calls: Mutex<Vec<ConversionJob>>,
    failing: HashSet<String>,
    corrupt: HashSet<String>,
    jitter: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail (exit status 1, nothing written) for the output file `name`.
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Succeed for `name` but write bytes no decoder accepts.
    pub fn corrupt_on(mut self, name: &str) -> Self {
        self.corrupt.insert(name.to_string());
        self
    }

    /// Sleep a few milliseconds per job so completion order is scrambled.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn calls(&self) -> Vec<ConversionJob> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Converter for MockConverter {
    fn convert(&self, job: &ConversionJob, cancel: &CancelToken) -> Result<(), ConvertError> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(job.clone());

        if self.jitter {
            // Vary the delay per job so completion order differs from submission order.
            let delay = 2 + (7 * job.spec_index + job.output.as_os_str().len()) % 9;
            std::thread::sleep(Duration::from_millis(delay as u64));
        }

        let name = job
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = if self.failing.contains(&name) {
            Err(ConvertError::Failed { code: 1 })
        } else if self.corrupt.contains(&name) {
            fs::write(&job.output, b"not an image").map_err(ConvertError::from)
        } else {
            write_variant(job)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn write_variant(job: &ConversionJob) -> Result<(), ConvertError> {
    if let Some(parent) = job.output.parent() {
        fs::create_dir_all(parent)?;
    }
    match job.format {
        Format::Jpeg => {
            let width = job.spec.max_dimension;
            let height = (width * 3 / 4).max(1);
            image::RgbImage::new(width, height)
                .save_with_format(&job.output, image::ImageFormat::Jpeg)
                .map_err(|e| ConvertError::Io(std::io::Error::other(e)))
        }
        Format::WebP => fs::write(&job.output, b"RIFF-placeholder").map_err(ConvertError::from),
    }
}
