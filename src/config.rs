//! Pipeline configuration.
//!
//! Loaded from an optional `config.toml` in the working directory (or a path
//! given with `--config`). User values are merged key-by-key on top of the
//! stock defaults, unknown keys are rejected, and the result is validated.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [[variants]]               # Ordered ladder; the first entry feeds the layout hint
//! max_dimension = 100        # Longer edge in pixels (never upscaled)
//! quality = 0.2              # Fraction in (0, 1]
//! # ... 350/0.25, 500/0.25, 800/0.25, 1300/0.25, 2000/0.3, 3000/0.35
//!
//! [paths]
//! output_dir = "out"         # Derivatives, relative to the working directory
//! fragment_dir = "html"      # Fragments, relative to the working directory
//!
//! [processing]
//! parallelism = 4            # Converter processes running at once
//! # job_timeout_secs = 120   # Kill a converter running longer than this
//!
//! [converter]
//! program = "magick"
//! sampling_factor = "4:1:1"
//! interlace = "Plane"
//!
//! [fragments]
//! url_prefix = "/img/"
//! alt_placeholder = ">>> Alternativtext <<<"
//!
//! [scan]
//! skip_extensions = ["jar", "zip", ...]
//! ```
//!
//! A `[[variants]]` array in a user file replaces the stock ladder entirely;
//! arrays are not merged element-wise.

use crate::types::DerivativeSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full pipeline configuration. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Size/quality ladder, in manifest order.
    pub variants: Vec<DerivativeSpec>,
    pub paths: PathsConfig,
    pub processing: ProcessingConfig,
    pub converter: ConverterConfig,
    pub fragments: FragmentsConfig,
    pub scan: ScanConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            paths: PathsConfig::default(),
            processing: ProcessingConfig::default(),
            converter: ConverterConfig::default(),
            fragments: FragmentsConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

/// Stock ladder: longest side in pixels to quality fraction.
pub fn default_variants() -> Vec<DerivativeSpec> {
    [
        (100, 0.2),
        (350, 0.25),
        (500, 0.25),
        (800, 0.25),
        (1300, 0.25),
        (2000, 0.3),
        (3000, 0.35),
    ]
    .into_iter()
    .map(|(size, quality)| DerivativeSpec::new(size, quality))
    .collect()
}

impl PipelineConfig {
    /// Validate values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.variants.is_empty() {
            return Err(ConfigError::Validation("variants must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for spec in &self.variants {
            if spec.max_dimension == 0 {
                return Err(ConfigError::Validation(
                    "variants.max_dimension must be positive".into(),
                ));
            }
            if !(spec.quality > 0.0 && spec.quality <= 1.0) {
                return Err(ConfigError::Validation(format!(
                    "variants.quality must be in (0, 1], got {} for size {}",
                    spec.quality, spec.max_dimension
                )));
            }
            if !seen.insert(spec.max_dimension) {
                return Err(ConfigError::Validation(format!(
                    "duplicate variant size {} would overwrite its own output",
                    spec.max_dimension
                )));
            }
        }
        if self.processing.parallelism == 0 {
            return Err(ConfigError::Validation(
                "processing.parallelism must be at least 1".into(),
            ));
        }
        if self.processing.job_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "processing.job_timeout_secs must be positive".into(),
            ));
        }
        if self.converter.program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "converter.program must not be empty".into(),
            ));
        }
        for (name, dir) in [
            ("paths.output_dir", &self.paths.output_dir),
            ("paths.fragment_dir", &self.paths.fragment_dir),
        ] {
            // Files written into the working directory would be scanned as sources.
            if dir.as_os_str().is_empty() || dir == Path::new(".") {
                return Err(ConfigError::Validation(format!(
                    "{name} must not be the working directory"
                )));
            }
        }
        if self.paths.output_dir == self.paths.fragment_dir {
            return Err(ConfigError::Validation(
                "paths.output_dir and paths.fragment_dir must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Output locations, relative to the working directory unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    pub fragment_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            fragment_dir: PathBuf::from("html"),
        }
    }
}

impl PathsConfig {
    pub fn output_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.output_dir)
    }

    pub fn fragment_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.fragment_dir)
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Number of converter processes running at once.
    pub parallelism: usize,
    /// Per-job limit in seconds. Absent means no limit.
    pub job_timeout_secs: Option<u64>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            job_timeout_secs: None,
        }
    }
}

impl ProcessingConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

/// External converter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    pub program: String,
    pub sampling_factor: String,
    pub interlace: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "magick".to_string(),
            sampling_factor: "4:1:1".to_string(),
            interlace: "Plane".to_string(),
        }
    }
}

/// Fragment rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FragmentsConfig {
    /// Prepended to derivative file names in fragment URLs.
    pub url_prefix: String,
    /// Placeholder alt text, meant to be edited by hand.
    pub alt_placeholder: String,
}

impl Default for FragmentsConfig {
    fn default() -> Self {
        Self {
            url_prefix: "/img/".to_string(),
            alt_placeholder: ">>> Alternativtext <<<".to_string(),
        }
    }
}

/// Source discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Extensions (case-insensitive, without the dot) never treated as images.
    pub skip_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_extensions: [
                "jar", "zip", "tar", "gz", "7z", "rar", "html", "txt", "md", "toml", "json",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock defaults as a `toml::Value`, the base layer for user overrides.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PipelineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay, arrays included, replace base values.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a TOML file as a raw value. `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, deserialize, validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `config.toml` from `working_dir`, falling back to defaults.
pub fn load_config(working_dir: &Path) -> Result<PipelineConfig, ConfigError> {
    load_config_file(&working_dir.join(CONFIG_FILENAME))
}

/// Load an explicit config file, falling back to defaults if it is absent.
pub fn load_config_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Fully-commented stock `config.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# variantgen configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys are an error.

# ---------------------------------------------------------------------------
# Variant ladder
# ---------------------------------------------------------------------------
# Each entry produces <name>_<max_dimension>.jpg and <name>_<max_dimension>.webp.
# Order matters: fragments list variants in this order, and the first entry
# provides the aspect-ratio layout hint. Defining [[variants]] here replaces
# the whole stock ladder.
[[variants]]
max_dimension = 100   # Longer edge in pixels; smaller sources are never upscaled
quality = 0.2         # Fraction in (0, 1]; passed to the converter as a percent

[[variants]]
max_dimension = 350
quality = 0.25

[[variants]]
max_dimension = 500
quality = 0.25

[[variants]]
max_dimension = 800
quality = 0.25

[[variants]]
max_dimension = 1300
quality = 0.25

[[variants]]
max_dimension = 2000
quality = 0.3

[[variants]]
max_dimension = 3000
quality = 0.35

# ---------------------------------------------------------------------------
# Paths (relative to the working directory)
# ---------------------------------------------------------------------------
[paths]
output_dir = "out"
fragment_dir = "html"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Number of converter processes running at once, shared by all images.
parallelism = 4
# Kill a converter that runs longer than this many seconds.
# job_timeout_secs = 120

# ---------------------------------------------------------------------------
# Converter (ImageMagick)
# ---------------------------------------------------------------------------
[converter]
program = "magick"
sampling_factor = "4:1:1"
interlace = "Plane"

# ---------------------------------------------------------------------------
# Fragments
# ---------------------------------------------------------------------------
[fragments]
# Prepended to derivative file names in data-jpg / data-webp.
url_prefix = "/img/"
alt_placeholder = ">>> Alternativtext <<<"

# ---------------------------------------------------------------------------
# Source discovery
# ---------------------------------------------------------------------------
[scan]
# Files with these extensions are never converted (case-insensitive).
skip_extensions = ["jar", "zip", "tar", "gz", "7z", "rar", "html", "txt", "md", "toml", "json"]
"##
}
