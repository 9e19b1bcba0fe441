use image::{GrayImage, Luma, Rgba, RgbaImage};

use crate::Error;

/// The color fill pixels are drawn with in [`Mask::to_overlay`]
pub const FILL_OVERLAY_COLOR: Rgba<u8> = Rgba([0, 255, 0, 127]);

/// What a mask pixel means for inpainting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Part of the subject. Kept as is.
    Subject,
    /// Background. Regenerated by the inpainting model.
    Fill,
}

impl Region {
    /// The boolean form inpainting models take, `true` marks pixels to regenerate
    pub fn is_fill(self) -> bool {
        matches!(self, Region::Fill)
    }
}

/// Inclusive-exclusive pixel bounds, `(x1, y1)` to `(x2, y2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// Left edge
    pub x1: u32,
    /// Top edge
    pub y1: u32,
    /// One past the right edge
    pub x2: u32,
    /// One past the bottom edge
    pub y2: u32,
}

/// A raw mask as a segmentation model returns it: `true` marks the selected subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionMask {
    width: u32,
    height: u32,
    selected: Vec<bool>,
}

impl SelectionMask {
    /// Create a mask from row-major data
    pub fn new(width: u32, height: u32, selected: Vec<bool>) -> Result<Self, Error> {
        let expected = width as usize * height as usize;
        if selected.len() != expected {
            return Err(Error::InvalidMaskData {
                expected,
                found: selected.len(),
            });
        }
        Ok(Self {
            width,
            height,
            selected,
        })
    }

    /// Create a mask by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let selected = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            selected,
        }
    }

    /// Create a mask from a grayscale image, pixels above `threshold` are selected
    pub fn from_luma(image: &GrayImage, threshold: u8) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            selected: image.pixels().map(|Luma([v])| *v > threshold).collect(),
        }
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the pixel at (x, y) is selected. Out of bounds pixels are not.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.selected[(y * self.width + x) as usize]
    }

    /// The row-major selection data
    pub fn as_slice(&self) -> &[bool] {
        &self.selected
    }

    /// The number of selected pixels
    pub fn selected_count(&self) -> usize {
        self.selected.iter().filter(|&&b| b).count()
    }
}

/// A mask ready for inpainting. Every pixel is tagged as [`Region::Subject`] or [`Region::Fill`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    regions: Vec<Region>,
}

impl Mask {
    /// Invert a segmentation result: selected pixels become the subject, the rest is filled.
    pub fn from_selection(selection: &SelectionMask) -> Self {
        Self {
            width: selection.width,
            height: selection.height,
            regions: selection
                .selected
                .iter()
                .map(|&selected| if selected { Region::Subject } else { Region::Fill })
                .collect(),
        }
    }

    /// Create a mask by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Region) -> Self {
        let regions = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            regions,
        }
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The region at (x, y), if it is inside the mask
    pub fn region(&self, x: u32, y: u32) -> Option<Region> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.regions[(y * self.width + x) as usize])
    }

    /// The row-major regions
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The boolean view, `true` marks pixels to regenerate
    pub fn to_bools(&self) -> Vec<bool> {
        self.regions.iter().map(|region| region.is_fill()).collect()
    }

    /// The number of pixels to regenerate
    pub fn fill_count(&self) -> usize {
        self.regions.iter().filter(|region| region.is_fill()).count()
    }

    /// The number of subject pixels
    pub fn subject_count(&self) -> usize {
        self.regions.len() - self.fill_count()
    }

    /// The tightest box around the subject, or `None` if there is no subject
    pub fn subject_bbox(&self) -> Option<BoundingBox> {
        let mut bbox: Option<BoundingBox> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.regions[(y * self.width + x) as usize] != Region::Subject {
                    continue;
                }
                let b = bbox.get_or_insert(BoundingBox {
                    x1: x,
                    y1: y,
                    x2: x + 1,
                    y2: y + 1,
                });
                b.x1 = b.x1.min(x);
                b.y1 = b.y1.min(y);
                b.x2 = b.x2.max(x + 1);
                b.y2 = b.y2.max(y + 1);
            }
        }
        bbox
    }

    /// The single channel image inpainting pipelines take: fill is white, the subject black.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            match self.regions[(y * self.width + x) as usize] {
                Region::Fill => Luma([255]),
                Region::Subject => Luma([0]),
            }
        })
    }

    /// A transparent overlay that tints the region to fill with [`FILL_OVERLAY_COLOR`]
    pub fn to_overlay(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            match self.regions[(y * self.width + x) as usize] {
                Region::Fill => FILL_OVERLAY_COLOR,
                Region::Subject => Rgba([0, 0, 0, 0]),
            }
        })
    }
}
