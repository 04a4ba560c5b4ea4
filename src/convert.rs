//! Converter invocation.
//!
//! Pixel work is delegated to an external program (ImageMagick's `magick` by
//! default). The [`Converter`] trait is the seam: production uses
//! [`MagickConverter`], tests use a recording mock that writes small images
//! directly.
//!
//! ## Command line
//!
//! ```text
//! magick <input> -quality <pct> -resize <size>x<size>> -strip \
//!        -sampling-factor 4:1:1 -interlace Plane <output>
//! ```
//!
//! The exit status is always checked. A non-zero exit, a kill by signal, a
//! timeout, a cancellation, or a missing output file all surface as a
//! [`ConvertError`] for that one job. Once a converter has been started and
//! fails, its output path is removed so the source is retried next run.

use crate::executor::CancelToken;
use crate::types::ConversionJob;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// How often a running child is checked for exit, timeout and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error while waiting for converter: {0}")]
    Io(#[from] std::io::Error),
    #[error("converter exited with status {code}")]
    Failed { code: i32 },
    #[error("converter was terminated by a signal")]
    Terminated,
    #[error("converter timed out after {}s", .0.as_secs_f32())]
    TimedOut(Duration),
    #[error("cancelled before completion")]
    Cancelled,
    #[error("converter reported success but wrote no file at {0}")]
    MissingOutput(PathBuf),
}

impl ConvertError {
    /// Process exit code, when the converter ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ConvertError::Failed { code } => Some(*code),
            _ => None,
        }
    }
}

/// Something that can turn one [`ConversionJob`] into a file at
/// `job.output`.
///
/// Implementations must be `Sync`: the executor calls them from every
/// worker thread at once. They should poll `cancel` while blocked and give
/// up with [`ConvertError::Cancelled`] once it fires.
pub trait Converter: Sync {
    fn convert(&self, job: &ConversionJob, cancel: &CancelToken) -> Result<(), ConvertError>;
}

/// Shells out to ImageMagick.
#[derive(Debug, Clone)]
pub struct MagickConverter {
    pub program: String,
    pub sampling_factor: String,
    pub interlace: String,
    /// Kill the child after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for MagickConverter {
    fn default() -> Self {
        Self {
            program: "magick".to_string(),
            sampling_factor: "4:1:1".to_string(),
            interlace: "Plane".to_string(),
            timeout: None,
        }
    }
}

impl MagickConverter {
    pub fn from_config(config: &crate::config::PipelineConfig) -> Self {
        Self {
            program: config.converter.program.clone(),
            sampling_factor: config.converter.sampling_factor.clone(),
            interlace: config.converter.interlace.clone(),
            timeout: config.processing.job_timeout(),
        }
    }

    /// Arguments for one job, excluding the program name.
    pub fn build_args(&self, job: &ConversionJob) -> Vec<OsString> {
        vec![
            job.source.path().into(),
            "-quality".into(),
            job.spec.quality_percent().to_string().into(),
            "-resize".into(),
            job.spec.bounding_box().into(),
            "-strip".into(),
            "-sampling-factor".into(),
            self.sampling_factor.clone().into(),
            "-interlace".into(),
            self.interlace.clone().into(),
            job.output.clone().into(),
        ]
    }

    pub fn build_command(&self, job: &ConversionJob) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl Converter for MagickConverter {
    fn convert(&self, job: &ConversionJob, cancel: &CancelToken) -> Result<(), ConvertError> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        let mut cmd = self.build_command(job);
        debug!(command = ?cmd, "spawning converter");
        let child = cmd.spawn().map_err(|source| ConvertError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if let Err(e) = wait_for(child, self.timeout, cancel).and_then(check_status) {
            discard_partial(&job.output);
            return Err(e);
        }

        if !job.output.is_file() {
            return Err(ConvertError::MissingOutput(job.output.clone()));
        }
        Ok(())
    }
}

/// Remove whatever a failed or killed converter left at `path`.
///
/// A partial file would be newer than its source and pass for a finished
/// derivative on the next run.
fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "cannot remove partial output"),
    }
}

/// Block until `child` exits, killing it on timeout or cancellation.
pub(crate) fn wait_for(
    mut child: Child,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<ExitStatus, ConvertError> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if cancel.is_cancelled() {
            kill(&mut child);
            return Err(ConvertError::Cancelled);
        }
        if let Some(limit) = timeout
            && started.elapsed() >= limit
        {
            kill(&mut child);
            return Err(ConvertError::TimedOut(limit));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child) {
    // The child may have exited between try_wait and kill.
    let _ = child.kill();
    let _ = child.wait();
}

fn check_status(status: ExitStatus) -> Result<(), ConvertError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ConvertError::Failed { code }),
        None => Err(ConvertError::Terminated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DerivativeSpec, Format, SourceFile};

    fn job() -> ConversionJob {
        ConversionJob {
            source: SourceFile::new("/in/dawn.png"),
            spec_index: 0,
            spec: DerivativeSpec::new(800, 0.25),
            format: Format::WebP,
            output: "/out/dawn_800.webp".into(),
        }
    }

    #[test]
    fn build_args_follow_magick_template() {
        let args = MagickConverter::default().build_args(&job());
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "/in/dawn.png",
                "-quality",
                "25",
                "-resize",
                "800x800>",
                "-strip",
                "-sampling-factor",
                "4:1:1",
                "-interlace",
                "Plane",
                "/out/dawn_800.webp",
            ]
        );
    }

    #[test]
    fn build_command_uses_configured_program() {
        let converter = MagickConverter {
            program: "/opt/im/bin/magick".to_string(),
            ..Default::default()
        };
        let cmd = converter.build_command(&job());
        assert_eq!(cmd.get_program(), "/opt/im/bin/magick");
    }

    #[test]
    fn exit_code_only_for_failed_runs() {
        assert_eq!(ConvertError::Failed { code: 3 }.exit_code(), Some(3));
        assert_eq!(ConvertError::Cancelled.exit_code(), None);
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let converter = MagickConverter {
            program: "/definitely/not/a/real/converter".to_string(),
            ..Default::default()
        };
        let result = converter.convert(&job(), &CancelToken::new());
        assert!(matches!(result, Err(ConvertError::Spawn { .. })));
    }

    #[test]
    fn cancelled_token_skips_spawn() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = MagickConverter::default().convert(&job(), &cancel);
        assert!(matches!(result, Err(ConvertError::Cancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported() {
        let child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let status = wait_for(child, None, &CancelToken::new()).unwrap();
        assert!(matches!(
            check_status(status),
            Err(ConvertError::Failed { code: 3 })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn hung_child_times_out() {
        let child = Command::new("sleep").arg("5").spawn().unwrap();
        let started = Instant::now();
        let result = wait_for(child, Some(Duration::from_millis(100)), &CancelToken::new());
        assert!(matches!(result, Err(ConvertError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn cancellation_kills_running_child() {
        let cancel = CancelToken::new();
        let child = Command::new("sleep").arg("5").spawn().unwrap();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });
        let result = wait_for(child, None, &cancel);
        canceller.join().unwrap();
        assert!(matches!(result, Err(ConvertError::Cancelled)));
    }

    /// A job whose "source" is a shell script, run as `sh <script> ... <output>`.
    #[cfg(unix)]
    fn scripted_job(dir: &Path, script: &str) -> (MagickConverter, ConversionJob) {
        let src = dir.join("dawn.sh");
        fs::write(&src, format!("for last; do :; done\n{script}\n")).unwrap();
        let converter = MagickConverter {
            program: "sh".to_string(),
            ..Default::default()
        };
        let job = ConversionJob {
            source: SourceFile::new(&src),
            spec_index: 0,
            spec: DerivativeSpec::new(800, 0.25),
            format: Format::Jpeg,
            output: dir.join("dawn_800.jpg"),
        };
        (converter, job)
    }

    #[cfg(unix)]
    #[test]
    fn failed_converter_leaves_no_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (converter, job) = scripted_job(tmp.path(), "printf partial > \"$last\"\nexit 1");

        let result = converter.convert(&job, &CancelToken::new());

        assert!(matches!(result, Err(ConvertError::Failed { code: 1 })));
        assert!(!job.output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn timed_out_converter_leaves_no_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (mut converter, job) = scripted_job(tmp.path(), "printf partial > \"$last\"\nsleep 5");
        converter.timeout = Some(Duration::from_millis(300));

        let result = converter.convert(&job, &CancelToken::new());

        assert!(matches!(result, Err(ConvertError::TimedOut(_))));
        assert!(!job.output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn cancelled_converter_leaves_no_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (converter, job) = scripted_job(tmp.path(), "printf partial > \"$last\"\nsleep 5");
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            trigger.cancel();
        });

        let result = converter.convert(&job, &cancel);
        canceller.join().unwrap();

        assert!(matches!(result, Err(ConvertError::Cancelled)));
        assert!(!job.output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn successful_converter_keeps_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (converter, job) = scripted_job(tmp.path(), "printf done > \"$last\"");

        converter.convert(&job, &CancelToken::new()).unwrap();
        assert_eq!(fs::read_to_string(&job.output).unwrap(), "done");
    }

    #[test]
    #[ignore] // Requires ImageMagick
    fn magick_converts_real_image() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("dawn.png");
        image::RgbImage::new(1200, 900).save(&src).unwrap();
        let job = ConversionJob {
            source: SourceFile::new(&src),
            spec_index: 0,
            spec: DerivativeSpec::new(300, 0.3),
            format: Format::Jpeg,
            output: tmp.path().join("dawn_300.jpg"),
        };
        MagickConverter::default()
            .convert(&job, &CancelToken::new())
            .unwrap();
        let (w, h) = image::image_dimensions(Path::new(&job.output)).unwrap();
        assert_eq!((w, h), (300, 225));
    }
}
