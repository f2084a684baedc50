//! Drawing sources: a text file read as a character grid, or an image
//! decoded into an RGB pixel grid.

mod raster;
mod text;

use std::path::Path;

pub use self::raster::{aspect_corrected, is_pre_corrected, load_image, PixelGrid};
pub use self::text::{load_text, TextGrid};

use crate::config::SourceKind;
use crate::error::SourceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Text(TextGrid),
    Image(PixelGrid),
}

impl Source {
    /// `correct_aspect` only affects images.
    pub fn load(kind: SourceKind, path: &Path, correct_aspect: bool) -> Result<Self, SourceError> {
        match kind {
            SourceKind::Text => load_text(path).map(Source::Text),
            SourceKind::Image => load_image(path, correct_aspect).map(Source::Image),
        }
    }

    /// Rows in source units (text lines or pixel rows).
    pub fn height(&self) -> usize {
        match self {
            Source::Text(grid) => grid.height(),
            Source::Image(grid) => grid.height(),
        }
    }
}
