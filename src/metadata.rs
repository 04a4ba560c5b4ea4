//! Dimension extraction from generated derivatives.
//!
//! Only the primary-format output is measured. `image::image_dimensions` reads
//! the header alone, so no pixel buffer is decoded.
//!
//! Any failure (missing file, truncated or corrupt data, unknown format)
//! collapses to `None`: the variant is still listed, just without a size
//! hint.

use crate::types::Dimensions;
use std::path::Path;
use tracing::debug;

/// Width and height of the encoded image at `path`, if recoverable.
pub fn extract_dimensions(path: &Path) -> Option<Dimensions> {
    match image::image_dimensions(path) {
        Ok((width, height)) => Some(Dimensions { width, height }),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "dimensions unavailable");
            None
        }
    }
}
