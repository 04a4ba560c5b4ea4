//! Per-source HTML fragments for lazy, responsive image loading.
//!
//! One file per manifest entry, `<fragment_dir>/<key>.embed.html`, holding a
//! single element a page script can expand into a `<picture>`:
//!
//! ```html
//! <div class="lazy" data-alt=">>> Alternativtext <<<" data-sizes="2" data-ratio="0.75">
//!   <span data-variant="0" data-jpg="/img/dawn_300.jpg" data-webp="/img/dawn_300.webp"
//!         data-w="300" data-h="225"></span>
//!   <span data-variant="1" data-jpg="/img/dawn_800.jpg" data-webp="/img/dawn_800.webp"></span>
//! </div>
//! ```
//!
//! `data-w`/`data-h` are omitted for variants whose dimensions could not be
//! read. `data-ratio` (height / width of the first variant) is omitted when
//! that variant has no dimensions.
//!
//! Uses [maud](https://maud.lambda.xyz/), so every attribute value is escaped.
//!
//! A source rebuilt without a single surviving variant has its previous
//! fragment removed by [`remove_stale`], so pages never point at derivatives
//! older than the source.

use crate::config::FragmentsConfig;
use crate::naming;
use crate::types::{DerivativeResult, ManifestEntry};
use maud::{Markup, html};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("cannot write fragment {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot remove fragment {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Public URL of a derivative: prefix + file name.
fn public_url(prefix: &str, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    format!("{}{}", prefix, name)
}

/// Layout hint from the first variant, rounded to 4 decimals.
fn ratio_hint(variants: &[DerivativeResult]) -> Option<String> {
    let ratio = variants.first()?.dimensions?.aspect_ratio()?;
    Some(format!("{:.4}", ratio))
}

/// Render the fragment for one manifest entry.
pub fn render_fragment(entry: &ManifestEntry, config: &FragmentsConfig) -> Markup {
    let prefix = config.url_prefix.as_str();
    html! {
        div.lazy
            data-alt=(config.alt_placeholder)
            data-sizes=(entry.variants.len())
            data-ratio=[ratio_hint(&entry.variants)]
        {
            @for (idx, variant) in entry.variants.iter().enumerate() {
                span
                    data-variant=(idx)
                    data-jpg=(public_url(prefix, &variant.primary))
                    data-webp=(public_url(prefix, &variant.secondary))
                    data-w=[variant.dimensions.map(|d| d.width)]
                    data-h=[variant.dimensions.map(|d| d.height)]
                {}
            }
        }
    }
}

/// Write the fragment for `entry` into `fragment_dir`, replacing any
/// previous one. Returns the written path.
pub fn emit(
    entry: &ManifestEntry,
    fragment_dir: &Path,
    config: &FragmentsConfig,
) -> Result<PathBuf, FragmentError> {
    let path = naming::fragment_path(fragment_dir, entry.source.key());
    let markup = render_fragment(entry, config);
    fs::write(&path, markup.into_string()).map_err(|source| FragmentError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Delete the fragment for `key` if one exists. Returns the removed path.
pub fn remove_stale(fragment_dir: &Path, key: &str) -> Result<Option<PathBuf>, FragmentError> {
    let path = naming::fragment_path(fragment_dir, key);
    match fs::remove_file(&path) {
        Ok(()) => Ok(Some(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(FragmentError::Remove { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dimensions, SourceFile};
    use tempfile::TempDir;

    fn variant(size: u32, dims: Option<(u32, u32)>) -> DerivativeResult {
        DerivativeResult {
            spec_index: 0,
            max_dimension: size,
            primary: format!("/work/out/dawn_{size}.jpg").into(),
            secondary: format!("/work/out/dawn_{size}.webp").into(),
            dimensions: dims.map(|(width, height)| Dimensions { width, height }),
        }
    }

    fn entry(variants: Vec<DerivativeResult>) -> ManifestEntry {
        ManifestEntry {
            source: SourceFile::new("/work/dawn.png"),
            variants,
        }
    }

    #[test]
    fn renders_all_variants_in_order() {
        let html = render_fragment(
            &entry(vec![variant(300, Some((300, 225))), variant(800, Some((800, 600)))]),
            &FragmentsConfig::default(),
        )
        .into_string();

        assert!(html.starts_with(r#"<div class="lazy""#));
        assert!(html.contains(r#"data-sizes="2""#));
        assert!(html.contains(r#"data-jpg="/img/dawn_300.jpg""#));
        assert!(html.contains(r#"data-webp="/img/dawn_800.webp""#));
        assert!(html.contains(r#"data-w="300" data-h="225""#));
        let first = html.find("dawn_300").unwrap();
        let second = html.find("dawn_800").unwrap();
        assert!(first < second);
    }

    #[test]
    fn alt_placeholder_is_escaped() {
        let html = render_fragment(&entry(vec![variant(300, None)]), &FragmentsConfig::default())
            .into_string();
        assert!(html.contains(r#"data-alt="&gt;&gt;&gt; Alternativtext &lt;&lt;&lt;""#));
    }

    #[test]
    fn missing_dimensions_omit_only_that_size_hint() {
        let html = render_fragment(
            &entry(vec![variant(300, Some((300, 225))), variant(800, None)]),
            &FragmentsConfig::default(),
        )
        .into_string();

        assert_eq!(html.matches("data-w=").count(), 1);
        assert_eq!(html.matches("data-h=").count(), 1);
        assert!(html.contains(r#"data-jpg="/img/dawn_800.jpg""#));
    }

    #[test]
    fn ratio_hint_from_first_variant() {
        let html = render_fragment(
            &entry(vec![variant(300, Some((300, 225))), variant(800, Some((800, 800)))]),
            &FragmentsConfig::default(),
        )
        .into_string();
        assert!(html.contains(r#"data-ratio="0.7500""#));
    }

    #[test]
    fn ratio_hint_omitted_without_first_dimensions() {
        let html = render_fragment(
            &entry(vec![variant(300, None), variant(800, Some((800, 600)))]),
            &FragmentsConfig::default(),
        )
        .into_string();
        assert!(!html.contains("data-ratio"));
    }

    #[test]
    fn custom_url_prefix() {
        let config = FragmentsConfig {
            url_prefix: "https://cdn.example.com/p/".to_string(),
            ..Default::default()
        };
        let html = render_fragment(&entry(vec![variant(300, None)]), &config).into_string();
        assert!(html.contains(r#"data-jpg="https://cdn.example.com/p/dawn_300.jpg""#));
    }

    #[test]
    fn emit_writes_key_named_file() {
        let tmp = TempDir::new().unwrap();
        let path = emit(
            &entry(vec![variant(300, Some((300, 225)))]),
            tmp.path(),
            &FragmentsConfig::default(),
        )
        .unwrap();

        assert_eq!(path, tmp.path().join("dawn.embed.html"));
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("dawn_300.webp"));
    }

    #[test]
    fn emit_into_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let result = emit(
            &entry(vec![variant(300, None)]),
            &tmp.path().join("missing"),
            &FragmentsConfig::default(),
        );
        assert!(matches!(result, Err(FragmentError::Write { .. })));
    }

    #[test]
    fn remove_stale_deletes_existing_fragment() {
        let tmp = TempDir::new().unwrap();
        let path = emit(
            &entry(vec![variant(300, None)]),
            tmp.path(),
            &FragmentsConfig::default(),
        )
        .unwrap();

        assert_eq!(remove_stale(tmp.path(), "dawn").unwrap(), Some(path.clone()));
        assert!(!path.exists());
        assert_eq!(remove_stale(tmp.path(), "dawn").unwrap(), None);
    }
}
