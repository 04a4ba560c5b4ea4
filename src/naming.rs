//! Centralized file naming for sources, derivatives and fragments.
//!
//! Every file the pipeline reads or writes is tied together by a **logical
//! key**: the file name with its last extension removed.
//!
//! ```text
//! dawn.png                 → key "dawn"
//! out/dawn_800.jpg         → key "dawn_800"   (derivative of "dawn" at 800)
//! out/dawn_800.webp
//! html/dawn.embed.html     → fragment for "dawn"
//! ```
//!
//! Derivative names are injective over `(key, max_dimension, format)`, so
//! two jobs can never write the same path as long as keys are unique and
//! the ladder has no duplicate sizes.

use crate::types::Format;
use std::path::{Path, PathBuf};

/// Suffix appended to the logical key for fragment files.
pub const FRAGMENT_SUFFIX: &str = ".embed.html";

/// File name with the last extension stripped.
///
/// - `"dawn.png"` → `"dawn"`
/// - `"holiday.2019.png"` → `"holiday.2019"`
/// - `"README"` → `"README"`
pub fn logical_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

/// A file name of the form `<key>_<size>.<ext>` with a known [`Format`]
/// extension, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeName {
    pub key: String,
    pub max_dimension: u32,
    pub format: Format,
}

/// Parse a derivative file name. `None` for anything the pipeline would not
/// have written: other extensions, no `_<digits>` suffix, empty key.
pub fn parse_derivative(path: &Path) -> Option<DerivativeName> {
    let format = Format::from_extension(path.extension()?.to_str()?)?;
    let key = logical_key(path);
    let (stem, size) = key.rsplit_once('_')?;
    if stem.is_empty() || size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(DerivativeName {
        key: stem.to_string(),
        max_dimension: size.parse().ok()?,
        format,
    })
}

/// Deterministic output path: `<out_dir>/<key>_<max_dimension>.<ext>`.
pub fn derivative_path(out_dir: &Path, key: &str, max_dimension: u32, format: Format) -> PathBuf {
    out_dir.join(format!("{}_{}.{}", key, max_dimension, format.extension()))
}

/// Fragment path: `<fragment_dir>/<key>.embed.html`.
pub fn fragment_path(fragment_dir: &Path, key: &str) -> PathBuf {
    fragment_dir.join(format!("{}{}", key, FRAGMENT_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_strips_only_last_extension() {
        assert_eq!(logical_key(Path::new("/in/dawn.png")), "dawn");
        assert_eq!(logical_key(Path::new("holiday.2019.png")), "holiday.2019");
        assert_eq!(logical_key(Path::new("README")), "README");
    }

    #[test]
    fn derivative_path_layout() {
        let out = Path::new("/work/out");
        assert_eq!(
            derivative_path(out, "dawn", 800, Format::Jpeg),
            PathBuf::from("/work/out/dawn_800.jpg")
        );
        assert_eq!(
            derivative_path(out, "dawn", 800, Format::WebP),
            PathBuf::from("/work/out/dawn_800.webp")
        );
    }

    #[test]
    fn derivative_name_maps_back_to_source() {
        assert_eq!(
            parse_derivative(Path::new("out/dawn_800.jpg")),
            Some(DerivativeName {
                key: "dawn".into(),
                max_dimension: 800,
                format: Format::Jpeg,
            })
        );
        let trip = parse_derivative(Path::new("out/my_trip_1300.webp")).unwrap();
        assert_eq!(trip.key, "my_trip");
        assert_eq!(trip.max_dimension, 1300);
        assert_eq!(trip.format, Format::WebP);
    }

    #[test]
    fn unrelated_names_are_not_derivatives() {
        assert_eq!(parse_derivative(Path::new("out/notes.txt")), None);
        assert_eq!(parse_derivative(Path::new("out/a_b.jpg")), None);
        assert_eq!(parse_derivative(Path::new("out/_300.jpg")), None);
        assert_eq!(parse_derivative(Path::new("out/dawn_800.avif")), None);
        assert_eq!(parse_derivative(Path::new("out/dawn_99999999999.jpg")), None);
    }

    #[test]
    fn derivative_path_round_trips_through_parse() {
        let path = derivative_path(Path::new("/out"), "holiday.2019", 350, Format::WebP);
        let parsed = parse_derivative(&path).unwrap();
        assert_eq!(parsed.key, "holiday.2019");
        assert_eq!(parsed.max_dimension, 350);
    }

    #[test]
    fn fragment_path_layout() {
        assert_eq!(
            fragment_path(Path::new("/work/html"), "dawn"),
            PathBuf::from("/work/html/dawn.embed.html")
        );
    }
}
