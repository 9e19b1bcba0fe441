use image::{RgbImage, RgbaImage};

use crate::{
    Error, ForegroundPoints, InpaintAdapter, Inpainter, Mask, MaskAdapter, PromptBundle, Segmenter,
};

/// Something that answers one request with one response, synchronously.
///
/// This is the seam between the pipeline and whatever front end collects the image, the clicks
/// and the prompt. Tests drive it directly.
pub trait RequestHandler<Request> {
    /// The result of a successful request
    type Response;

    /// Run the request to completion
    fn handle(&self, request: Request) -> Result<Self::Response, Error>;
}

/// Segment the subject under a set of points.
#[derive(Debug, Clone)]
pub struct MaskRequest {
    /// The image, usually from [`load_image`](crate::load_image)
    pub image: RgbImage,
    /// Points on the subject
    pub points: ForegroundPoints,
}

/// The mask for a [`MaskRequest`].
#[derive(Debug, Clone)]
pub struct MaskResponse {
    /// The mask, with the background marked for filling
    pub mask: Mask,
    /// A preview of the mask to draw over the image
    pub overlay: RgbaImage,
}

/// Regenerate the background of an image with a mask that is already known.
#[derive(Debug, Clone)]
pub struct FillRequest {
    /// The image
    pub image: RgbImage,
    /// The mask from an earlier [`MaskRequest`]
    pub mask: Mask,
    /// What to generate
    pub prompt: PromptBundle,
}

/// Segment the subject and regenerate its background in one go.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    /// The image
    pub image: RgbImage,
    /// Points on the subject
    pub points: ForegroundPoints,
    /// What to generate
    pub prompt: PromptBundle,
}

/// The result of a [`SwapRequest`].
#[derive(Debug, Clone)]
pub struct SwapResponse {
    /// The mask that was inpainted
    pub mask: Mask,
    /// A preview of the mask to draw over the image
    pub overlay: RgbaImage,
    /// The image with a new background
    pub result: RgbImage,
}

/// A segmentation model and an inpainting model, loaded once and shared by every request.
pub struct BackdropApp<S, I> {
    segmenter: S,
    inpainter: I,
}

impl<S: Segmenter, I: Inpainter> BackdropApp<S, I> {
    /// Create a new app from loaded models
    pub fn new(segmenter: S, inpainter: I) -> Self {
        Self {
            segmenter,
            inpainter,
        }
    }
}

impl<S: Segmenter, I: Inpainter> RequestHandler<MaskRequest> for BackdropApp<S, I> {
    type Response = MaskResponse;

    fn handle(&self, request: MaskRequest) -> Result<MaskResponse, Error> {
        let _span = tracing::debug_span!("mask", points = request.points.len()).entered();
        let mask = MaskAdapter::new(&self.segmenter).mask(&request.image, &request.points)?;
        let overlay = mask.to_overlay();
        Ok(MaskResponse { mask, overlay })
    }
}

impl<S: Segmenter, I: Inpainter> RequestHandler<FillRequest> for BackdropApp<S, I> {
    type Response = RgbImage;

    fn handle(&self, request: FillRequest) -> Result<RgbImage, Error> {
        let _span = tracing::debug_span!("fill", seed = request.prompt.seed()).entered();
        InpaintAdapter::new(&self.inpainter).inpaint(&request.image, &request.mask, &request.prompt)
    }
}

impl<S: Segmenter, I: Inpainter> RequestHandler<SwapRequest> for BackdropApp<S, I> {
    type Response = SwapResponse;

    fn handle(&self, request: SwapRequest) -> Result<SwapResponse, Error> {
        let SwapRequest {
            image,
            points,
            prompt,
        } = request;
        let MaskResponse { mask, overlay } = RequestHandler::<MaskRequest>::handle(
            self,
            MaskRequest {
                image: image.clone(),
                points,
            },
        )?;
        let result = RequestHandler::<FillRequest>::handle(
            self,
            FillRequest {
                image,
                mask: mask.clone(),
                prompt,
            },
        )?;
        Ok(SwapResponse {
            mask,
            overlay,
            result,
        })
    }
}
