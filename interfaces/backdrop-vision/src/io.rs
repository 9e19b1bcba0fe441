use std::path::Path;

use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};

use crate::Error;

/// The square resolution images are processed at
pub const WORKING_RESOLUTION: u32 = 512;

/// Read an image from disk as RGB, resized to [`WORKING_RESOLUTION`] on both sides.
pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage, Error> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(
        "loaded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(to_working_resolution(image))
}

/// Convert any image to RGB at [`WORKING_RESOLUTION`]. The aspect ratio is not kept.
pub fn to_working_resolution(image: DynamicImage) -> RgbImage {
    let image = image.to_rgb8();
    if image.dimensions() == (WORKING_RESOLUTION, WORKING_RESOLUTION) {
        return image;
    }
    image::imageops::resize(
        &image,
        WORKING_RESOLUTION,
        WORKING_RESOLUTION,
        FilterType::CatmullRom,
    )
}

/// Tile equally sized images into a `rows` x `cols` grid, filled row by row.
pub fn make_image_grid(images: &[DynamicImage], rows: u32, cols: u32) -> Result<RgbaImage, Error> {
    let grid_size = || Error::GridSize {
        rows,
        cols,
        found: images.len(),
    };
    let cells = rows.checked_mul(cols).ok_or_else(grid_size)?;
    if images.len() != cells as usize || images.is_empty() {
        return Err(grid_size());
    }

    let (width, height) = (images[0].width(), images[0].height());
    let (grid_width, grid_height) = width
        .checked_mul(cols)
        .zip(height.checked_mul(rows))
        .ok_or_else(grid_size)?;
    let mut grid = RgbaImage::new(grid_width, grid_height);
    for (i, image) in images.iter().enumerate() {
        let found = (image.width(), image.height());
        if found != (width, height) {
            return Err(Error::DimensionMismatch {
                what: "grid cell",
                expected: (width, height),
                found,
            });
        }
        let (row, col) = (i as u32 / cols, i as u32 % cols);
        image::imageops::replace(
            &mut grid,
            &image.to_rgba8(),
            (col * width) as i64,
            (row * height) as i64,
        );
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    #[test]
    fn loads_and_resizes_to_the_working_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("car.png");
        RgbImage::from_pixel(300, 200, Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();

        let image = load_image(&path).unwrap();
        assert_eq!(image.dimensions(), (512, 512));
        assert_eq!(image.get_pixel(256, 256), &Rgb([200, 10, 10]));
    }

    #[test]
    fn missing_files_report_the_path() {
        let err = load_image("/does/not/exist.png").unwrap_err();
        assert!(err.to_string().contains("/does/not/exist.png"));
    }

    #[test]
    fn alpha_is_dropped() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 0])));
        let rgb = to_working_resolution(image);
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn grid_places_images_row_major() {
        let cell = |v| DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([v, v, v])));
        let grid = make_image_grid(&[cell(10), cell(20), cell(30)], 1, 3).unwrap();
        assert_eq!(grid.dimensions(), (6, 2));
        assert_eq!(grid.get_pixel(0, 0), &Rgba([10, 10, 10, 255]));
        assert_eq!(grid.get_pixel(3, 1), &Rgba([20, 20, 20, 255]));
        assert_eq!(grid.get_pixel(5, 0), &Rgba([30, 30, 30, 255]));
    }

    #[test]
    fn grid_needs_a_full_set_of_images() {
        let cell = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let err = make_image_grid(&[cell], 2, 2).unwrap_err();
        assert!(matches!(err, Error::GridSize { found: 1, .. }));
    }

    #[test]
    fn oversized_grids_are_an_error() {
        let err = make_image_grid(&[], 65536, 65536).unwrap_err();
        assert!(matches!(err, Error::GridSize { found: 0, .. }));
        assert!(err.to_string().contains("65536x65536"));
    }

    #[test]
    fn grid_cells_must_share_a_size() {
        let err = make_image_grid(
            &[
                DynamicImage::ImageRgb8(RgbImage::new(2, 2)),
                DynamicImage::ImageRgb8(RgbImage::new(3, 2)),
            ],
            1,
            2,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { what: "grid cell", .. }));
    }
}
