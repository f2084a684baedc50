use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tile_proto::Rgb;
use tracing::debug;

use crate::error::SourceError;

/// Row-major RGB pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl PixelGrid {
    #[cfg(test)]
    pub fn filled(width: usize, height: usize, color: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    pub fn from_image(image: &RgbImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            pixels: image.pixels().map(|pixel| Rgb::from(pixel.0)).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    pub fn row(&self, y: usize) -> &[Rgb] {
        let start = (y * self.width).min(self.pixels.len());
        let end = (start + self.width).min(self.pixels.len());
        &self.pixels[start..end]
    }
}

/// Canvas cells are taller than they are wide; stretch width by 6/5 and
/// squash height to 7/10 so the drawing keeps its proportions.
pub fn aspect_corrected(width: u32, height: u32) -> (u32, u32) {
    let width = (u64::from(width) * 6 / 5).max(1);
    let height = (u64::from(height) * 7 / 10).max(1);
    (
        u32::try_from(width).unwrap_or(u32::MAX),
        u32::try_from(height).unwrap_or(u32::MAX),
    )
}

/// Images saved with a `_resized` stem were corrected by an earlier run.
pub fn is_pre_corrected(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.contains("_resized"))
}

/// Decodes an image and, unless `correct_aspect` is off or the file is
/// already corrected, applies the canvas aspect correction with a Lanczos3
/// filter.
pub fn load_image(path: &Path, correct_aspect: bool) -> Result<PixelGrid, SourceError> {
    let decoded = image::open(path)
        .map_err(|source| SourceError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    if !correct_aspect || is_pre_corrected(path) {
        debug!(
            path = %path.display(),
            width = decoded.width(),
            height = decoded.height(),
            "using image at its stored size"
        );
        return Ok(PixelGrid::from_image(&decoded));
    }
    let (width, height) = aspect_corrected(decoded.width(), decoded.height());
    debug!(
        path = %path.display(),
        from_width = decoded.width(),
        from_height = decoded.height(),
        width,
        height,
        "resizing image for canvas aspect"
    );
    let resized = imageops::resize(&decoded, width, height, FilterType::Lanczos3);
    Ok(PixelGrid::from_image(&resized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn aspect_correction_floors_and_never_collapses() {
        assert_eq!(aspect_corrected(10, 10), (12, 7));
        assert_eq!(aspect_corrected(100, 80), (120, 56));
        assert_eq!(aspect_corrected(1, 1), (1, 1));
    }

    #[test_timeout::timeout]
    fn grid_lookups_stay_in_bounds() {
        let mut picture = RgbImage::new(2, 1);
        picture.put_pixel(1, 0, image::Rgb([1, 2, 3]));
        let grid = PixelGrid::from_image(&picture);
        assert_eq!(grid.get(1, 0), Some(Rgb::new(1, 2, 3)));
        assert_eq!(grid.get(2, 0), None);
        assert_eq!(grid.row(0).len(), 2);
        assert!(grid.row(5).is_empty());
    }

    #[test_timeout::timeout]
    fn loads_and_resizes_png() {
        let path = std::env::temp_dir().join(format!("tilecast-{}.png", uuid::Uuid::new_v4()));
        RgbImage::from_pixel(10, 20, image::Rgb([200, 10, 10]))
            .save(&path)
            .expect("write png");
        let grid = load_image(&path, true).expect("load");
        assert_eq!((grid.width(), grid.height()), (12, 14));
        let center = grid.get(6, 7).expect("pixel");
        assert!(center.r > 150 && center.g < 60, "unexpected {center}");
        let _ = std::fs::remove_file(path);
    }

    #[test_timeout::timeout]
    fn corrected_images_keep_their_size() {
        let dir = std::env::temp_dir();
        let plain = dir.join(format!("tilecast-{}.png", uuid::Uuid::new_v4()));
        let marked = dir.join(format!("tilecast-{}_resized.png", uuid::Uuid::new_v4()));
        for path in [&plain, &marked] {
            RgbImage::from_pixel(10, 20, image::Rgb([0, 0, 255]))
                .save(path)
                .expect("write png");
        }
        assert!(is_pre_corrected(&marked));
        assert!(!is_pre_corrected(&plain));

        let grid = load_image(&marked, true).expect("load");
        assert_eq!((grid.width(), grid.height()), (10, 20));
        let grid = load_image(&plain, false).expect("load");
        assert_eq!((grid.width(), grid.height()), (10, 20));
        let _ = std::fs::remove_file(plain);
        let _ = std::fs::remove_file(marked);
    }

    #[test_timeout::timeout]
    fn undecodable_file_is_an_image_error() {
        let path = std::env::temp_dir().join(format!("tilecast-{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"not a png").expect("write");
        assert!(matches!(load_image(&path, true), Err(SourceError::Image { .. })));
        let _ = std::fs::remove_file(path);
    }
}
