//! # variantgen
//!
//! Incremental, parallel generation of responsive image derivatives.
//!
//! Point it at a directory of images. For every image it produces a ladder of
//! downscaled copies in two formats (JPEG and WebP) plus a small HTML
//! fragment a page script can expand into a lazy-loading `<picture>`:
//!
//! ```text
//! photos/
//! ├── config.toml            # optional, see `variantgen gen-config`
//! ├── dawn.png               # source
//! ├── out/
//! │   ├── dawn_100.jpg       # <key>_<max_dimension>.<ext>
//! │   ├── dawn_100.webp
//! │   └── ...
//! └── html/
//!     └── dawn.embed.html    # one fragment per converted source
//! ```
//!
//! # Architecture: One Run, Six Steps
//!
//! ```text
//! 1. Index      out/            →  oldest derivative mtime per key
//! 2. Resolve    sources + index →  stale sources
//! 3. Generate   stale sources   →  jobs (source × variant × format)
//! 4. Execute    jobs            →  outcomes (bounded pool, barrier)
//! 5. Aggregate  outcomes        →  manifest (+ dimensions of each JPEG)
//! 6. Emit       manifest        →  html/<key>.embed.html
//! ```
//!
//! The filesystem is the only state: a source is rebuilt when it is newer
//! than its oldest derivative, or when one of its derivatives is missing.
//! A second run over an unchanged directory does nothing.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | One run end to end, and the [`pipeline::RunReport`] it produces |
//! | [`scan`] | Flat source discovery, skip predicate, logical-key collisions |
//! | [`index`] | Output index and the staleness check |
//! | [`jobs`] | Expands a source into its conversion jobs |
//! | [`executor`] | Bounded rayon pool, cancellation, progress events |
//! | [`convert`] | The `Converter` seam and the ImageMagick implementation |
//! | [`metadata`] | Header-only dimension probing |
//! | [`aggregate`] | Regroups outcomes into the per-source manifest |
//! | [`fragment`] | Renders and writes the HTML fragments using Maud |
//! | [`config`] | `config.toml` loading, stock defaults, validation |
//! | [`naming`] | Logical keys and every derived file name |
//! | [`types`] | Shared types passed between steps |
//! | [`output`] | CLI formatting of progress and the run summary |
//!
//! # Design Decisions
//!
//! ## ImageMagick Does the Pixels
//!
//! Resizing and encoding are delegated to an external `magick` process per
//! job. The crate owns scheduling, staleness and bookkeeping; it never
//! decodes a full image itself. The [`convert::Converter`] trait is the seam,
//! so tests run the whole pipeline with a mock that writes small JPEGs.
//!
//! ## One Queue for All Sources
//!
//! Jobs of every stale source share a single pool of `parallelism` workers.
//! A source with a long ladder does not hold back the others, and a failed
//! job never cancels its siblings unless `--fail-fast` is set.
//!
//! ## Fragments Only From Complete Results
//!
//! The executor is a barrier. Fragments are written after every job has
//! finished, from variants whose JPEG and WebP both succeeded.

pub mod aggregate;
pub mod config;
pub mod convert;
pub mod executor;
pub mod fragment;
pub mod index;
pub mod jobs;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod scan;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
