use image::{GrayImage, RgbImage};

use crate::{ForegroundPoints, Generator, SelectionMask};

/// The error type model backends report failures with
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The input to a [`Segmenter`]
#[derive(Debug, Clone, Copy)]
pub struct SegmentationRequest<'a> {
    /// The image to segment
    pub image: &'a RgbImage,
    /// Points on the subject, in pixels
    pub points: &'a ForegroundPoints,
}

/// One mask proposed by a [`Segmenter`]
#[derive(Debug, Clone, PartialEq)]
pub struct MaskCandidate {
    /// The proposed mask, at the resolution of the input image
    pub mask: SelectionMask,
    /// The predicted intersection-over-union, higher is more confident
    pub iou_score: f32,
}

/// The output of a [`Segmenter`]
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationResponse {
    /// Every proposed mask, in the order the model returned them
    pub candidates: Vec<MaskCandidate>,
    /// The size of the input image as (width, height)
    pub original_size: (u32, u32),
    /// The size the image was resized to before it went through the model, as (width, height)
    pub reshaped_input_size: (u32, u32),
}

/// A model that proposes masks for the subject under a set of points.
pub trait Segmenter {
    /// Propose masks for the subject marked by `request.points`
    fn segment(
        &self,
        request: SegmentationRequest<'_>,
    ) -> Result<SegmentationResponse, CapabilityError>;
}

/// The input to an [`Inpainter`]
#[derive(Debug, Clone, Copy)]
pub struct InpaintRequest<'a> {
    /// The image to repaint
    pub image: &'a RgbImage,
    /// White pixels are regenerated, black pixels are kept
    pub mask: &'a GrayImage,
    /// What to generate
    pub prompt: &'a str,
    /// What to steer away from
    pub negative_prompt: Option<&'a str>,
    /// The random source for the run
    pub generator: Generator,
    /// How strongly to follow the prompt
    pub guidance_scale: f64,
}

/// A text conditioned model that regenerates the masked part of an image.
pub trait Inpainter {
    /// Regenerate the white pixels of `request.mask`
    fn inpaint(&self, request: InpaintRequest<'_>) -> Result<RgbImage, CapabilityError>;
}

impl<T: Segmenter + ?Sized> Segmenter for &T {
    fn segment(
        &self,
        request: SegmentationRequest<'_>,
    ) -> Result<SegmentationResponse, CapabilityError> {
        (**self).segment(request)
    }
}

impl<T: Segmenter + ?Sized> Segmenter for Box<T> {
    fn segment(
        &self,
        request: SegmentationRequest<'_>,
    ) -> Result<SegmentationResponse, CapabilityError> {
        (**self).segment(request)
    }
}

impl<T: Inpainter + ?Sized> Inpainter for &T {
    fn inpaint(&self, request: InpaintRequest<'_>) -> Result<RgbImage, CapabilityError> {
        (**self).inpaint(request)
    }
}

impl<T: Inpainter + ?Sized> Inpainter for Box<T> {
    fn inpaint(&self, request: InpaintRequest<'_>) -> Result<RgbImage, CapabilityError> {
        (**self).inpaint(request)
    }
}
