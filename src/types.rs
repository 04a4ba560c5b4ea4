//! Shared types passed between pipeline stages.
//!
//! Everything here is created and consumed within a single run. Nothing is
//! kept in memory across runs; the filesystem (existing derivatives and their
//! modification times) is the only durable state.

use crate::naming;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// An input image discovered in the working directory.
///
/// Identity is the absolute path; the logical key (file name without its
/// last extension) links the source to its derivatives and its fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceFile {
    path: PathBuf,
    key: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key = naming::logical_key(&path);
        Self { path, key }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// File name for display purposes.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// One entry of the configured size/quality ladder.
///
/// `max_dimension` bounds the longer edge (shrink to fit, never upscale);
/// `quality` is a fraction in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DerivativeSpec {
    pub max_dimension: u32,
    pub quality: f32,
}

impl DerivativeSpec {
    pub fn new(max_dimension: u32, quality: f32) -> Self {
        Self {
            max_dimension,
            quality,
        }
    }

    /// Quality as an integer percentage, the form the converter expects.
    pub fn quality_percent(&self) -> u32 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u32
    }

    /// Bounding box argument: `{size}x{size}>` (the `>` forbids upscaling).
    pub fn bounding_box(&self) -> String {
        format!("{0}x{0}>", self.max_dimension)
    }
}

/// Output encodings. Both are generated for every [`DerivativeSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Universally supported lossy format; the one measured for dimensions.
    Jpeg,
    /// Modern, more efficient format.
    WebP,
}

impl Format {
    /// Every format, in generation order.
    pub const ALL: [Format; 2] = [Format::Jpeg, Format::WebP];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Jpeg => "jpg",
            Format::WebP => "webp",
        }
    }

    pub fn is_primary(self) -> bool {
        self == Format::Jpeg
    }

    /// Format written with extension `ext`, if any.
    pub fn from_extension(ext: &str) -> Option<Format> {
        Format::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A single converter invocation: one source at one spec in one format.
///
/// `spec_index` is the position of `spec` in the configured ladder and is
/// what manifest ordering is rebuilt from after parallel execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    pub source: SourceFile,
    pub spec_index: usize,
    pub spec: DerivativeSpec,
    pub format: Format,
    pub output: PathBuf,
}

/// Pixel dimensions read from an encoded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Height divided by width, used to reserve layout space before load.
    pub fn aspect_ratio(&self) -> Option<f64> {
        (self.width > 0).then(|| self.height as f64 / self.width as f64)
    }
}

/// The paired outputs of one spec for one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivativeResult {
    pub spec_index: usize,
    pub max_dimension: u32,
    pub primary: PathBuf,
    pub secondary: PathBuf,
    /// Read from the primary output. `None` means "omit the size hint".
    pub dimensions: Option<Dimensions>,
}

/// Variants produced for one source during this run, in ladder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub source: SourceFile,
    pub variants: Vec<DerivativeResult>,
}

/// All sources processed in this run, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn get(&self, source: &SourceFile) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| &e.source == source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_key_strips_last_extension() {
        let src = SourceFile::new("/photos/holiday.2019.png");
        assert_eq!(src.key(), "holiday.2019");
        assert_eq!(src.file_name(), "holiday.2019.png");
    }

    #[test]
    fn quality_percent_rounds_fraction() {
        assert_eq!(DerivativeSpec::new(100, 0.2).quality_percent(), 20);
        assert_eq!(DerivativeSpec::new(3000, 0.35).quality_percent(), 35);
        assert_eq!(DerivativeSpec::new(800, 1.0).quality_percent(), 100);
    }

    #[test]
    fn bounding_box_never_upscales() {
        assert_eq!(DerivativeSpec::new(800, 0.3).bounding_box(), "800x800>");
    }

    #[test]
    fn format_extensions() {
        assert_eq!(Format::Jpeg.extension(), "jpg");
        assert_eq!(Format::WebP.extension(), "webp");
        assert!(Format::Jpeg.is_primary());
        assert!(!Format::WebP.is_primary());
        assert_eq!(Format::from_extension("webp"), Some(Format::WebP));
        assert_eq!(Format::from_extension("png"), None);
    }

    #[test]
    fn aspect_ratio_is_height_over_width() {
        let dims = Dimensions {
            width: 400,
            height: 300,
        };
        assert_eq!(dims.aspect_ratio(), Some(0.75));
        let degenerate = Dimensions {
            width: 0,
            height: 10,
        };
        assert_eq!(degenerate.aspect_ratio(), None);
    }
}
