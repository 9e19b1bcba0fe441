use std::path::PathBuf;

use crate::CapabilityError;

/// An error from the background replacement pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A point group had no points in it
    #[error("at least one foreground point is required")]
    EmptyPoints,
    /// The segmentation model did not propose any mask
    #[error("the segmentation model returned no mask candidates")]
    NoMaskCandidates,
    /// Two grids that must line up have different sizes
    #[error("{what} is {}x{} but the image is {}x{}", found.0, found.1, expected.0, expected.1)]
    DimensionMismatch {
        /// What was compared against the image
        what: &'static str,
        /// The image size as (width, height)
        expected: (u32, u32),
        /// The mismatched size as (width, height)
        found: (u32, u32),
    },
    /// Raw mask data does not cover the declared size
    #[error("mask data has {found} pixels, expected {expected}")]
    InvalidMaskData {
        /// width * height
        expected: usize,
        /// The number of values supplied
        found: usize,
    },
    /// The segmentation model failed
    #[error("segmentation failed: {0}")]
    Segmentation(#[source] CapabilityError),
    /// The inpainting model failed
    #[error("inpainting failed: {0}")]
    Inpainting(#[source] CapabilityError),
    /// An image could not be read or decoded
    #[error("failed to load image {}", path.display())]
    Image {
        /// The file that was being read
        path: PathBuf,
        /// The decoding error
        #[source]
        source: image::ImageError,
    },
    /// The number of images does not fill the requested grid
    #[error("{found} images cannot fill a {rows}x{cols} grid")]
    GridSize {
        /// Rows in the grid
        rows: u32,
        /// Columns in the grid
        cols: u32,
        /// The number of images supplied
        found: usize,
    },
}
