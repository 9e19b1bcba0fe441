//! # RSam
//!
//! A [Segment Anything](https://segment-anything.com/) segmentation model for backdrop, running on
//! [candle](https://github.com/huggingface/candle).
//!
//! [`SegmentAnything`] implements [`Segmenter`]: given an image and a few points on the subject it
//! proposes three masks at the resolution of the input image, each with SAM's predicted IoU.
//!
//! ## Usage
//!
//! ```rust, no_run
//! use backdrop_vision::*;
//! use rsam::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let model = SegmentAnything::builder().build().await?;
//!     let image = load_image("car.png")?;
//!     let mask = MaskAdapter::new(&model).mask(
//!         &image,
//!         &ForegroundPoints::new([Point::new(150, 170), Point::new(300, 250)])?,
//!     )?;
//!     mask.to_overlay().save("mask.png")?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use backdrop_common::{Cache, FileSource, ModelLoadingProgress};
use backdrop_model_types::ModelBuilder;
use backdrop_vision::{
    CapabilityError, ForegroundPoints, MaskCandidate, SegmentationRequest, SegmentationResponse,
    Segmenter, SelectionMask,
};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::segment_anything::sam::{self, Sam};
use image::{imageops::FilterType, GrayImage, RgbImage};

/// A builder for [`SegmentAnything`].
#[derive(Default)]
pub struct SegmentAnythingBuilder {
    source: SegmentAnythingSource,

    cpu: bool,

    threshold: f32,

    cache: Cache,
}

impl SegmentAnythingBuilder {
    /// Sets the source of the model.
    pub fn source(mut self, source: SegmentAnythingSource) -> Self {
        self.source = source;
        self
    }

    /// Set to true to run the model on CPU.
    pub fn cpu(mut self, cpu: bool) -> Self {
        self.cpu = cpu;
        self
    }

    /// Sets the logit threshold for the masks, 0 is the default value.
    /// - A negative values makes the model return a larger mask.
    /// - A positive makes the model return a smaller mask.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the cache the weights are downloaded into.
    pub fn cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    /// Builds the [`SegmentAnything`] model.
    pub async fn build(self) -> anyhow::Result<SegmentAnything> {
        self.build_with_loading_handler(|_| {}).await
    }

    /// Build the model with a handler for progress as the download and loading progresses.
    pub async fn build_with_loading_handler(
        self,
        progress_handler: impl FnMut(ModelLoadingProgress) + Send + Sync + 'static,
    ) -> anyhow::Result<SegmentAnything> {
        SegmentAnything::new(self, progress_handler).await
    }
}

#[async_trait::async_trait]
impl ModelBuilder for SegmentAnythingBuilder {
    type Model = SegmentAnything;
    type Error = anyhow::Error;

    async fn start_with_loading_handler(
        self,
        handler: impl FnMut(ModelLoadingProgress) + Send + Sync + 'static,
    ) -> anyhow::Result<Self::Model> {
        self.build_with_loading_handler(handler).await
    }

    fn requires_download(&self) -> bool {
        !self.cache.exists(&self.source.model)
    }
}

/// The source of the model.
#[derive(Debug, Clone)]
pub struct SegmentAnythingSource {
    model: FileSource,
    tiny: bool,
}

impl SegmentAnythingSource {
    /// Creates a new [`SegmentAnythingSource`] for full sized SAM weights on Hugging Face.
    pub fn new(model: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            model: FileSource::huggingface_main(model.into(), filename.into()),
            tiny: false,
        }
    }

    /// Creates a new [`SegmentAnythingSource`] from a local safetensors file.
    pub fn local(path: impl Into<std::path::PathBuf>, tiny: bool) -> Self {
        Self {
            model: FileSource::local(path),
            tiny,
        }
    }

    /// Create the tiny SAM model source.
    pub fn tiny() -> Self {
        let mut self_ = Self::new("lmz/candle-sam", "mobile_sam-tiny-vitt.safetensors");
        self_.tiny = true;
        self_
    }

    /// Create a normal sized model source.
    pub fn medium() -> Self {
        Self::new("lmz/candle-sam", "sam_vit_b_01ec64.safetensors")
    }
}

impl Default for SegmentAnythingSource {
    fn default() -> Self {
        Self::medium()
    }
}

/// The [segment anything](https://segment-anything.com/) model.
pub struct SegmentAnything {
    device: Device,
    sam: Sam,
    threshold: f32,
}

impl SegmentAnything {
    /// Creates a new [`SegmentAnythingBuilder`].
    pub fn builder() -> SegmentAnythingBuilder {
        SegmentAnythingBuilder::default()
    }

    async fn new(
        settings: SegmentAnythingBuilder,
        mut progress_handler: impl FnMut(ModelLoadingProgress) + Send + Sync + 'static,
    ) -> anyhow::Result<Self> {
        let SegmentAnythingBuilder {
            source,
            cpu,
            threshold,
            cache,
        } = settings;
        let model =
            backdrop_common::download(&cache, "SAM weights", &source.model, &mut progress_handler)
                .await?;
        progress_handler(ModelLoadingProgress::loading(0.));

        let device = backdrop_common::device(cpu)?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model], DType::F32, &device)? };
        let sam = if source.tiny {
            sam::Sam::new_tiny(vb)? // tiny vit_t
        } else {
            sam::Sam::new(768, 12, 12, &[2, 5, 8, 11], vb)? // sam_vit_b
        };
        progress_handler(ModelLoadingProgress::loading(1.));
        tracing::debug!("loaded SAM (tiny: {}) on {:?}", source.tiny, device);

        Ok(Self {
            device,
            sam,
            threshold,
        })
    }

    /// Propose masks for the subject under `points`, which are given in pixels.
    ///
    /// Every candidate is returned at the resolution of `image`, in the order SAM produced them.
    pub fn segment_points(
        &self,
        image: &RgbImage,
        points: &ForegroundPoints,
    ) -> anyhow::Result<SegmentationResponse> {
        let original_size = image.dimensions();
        let (image_tensor, reshaped_input_size) = self.image_to_tensor(image)?;

        let points = points
            .iter()
            .map(|point| {
                let (x, y) = point.normalized(original_size.0, original_size.1);
                (x, y, true)
            })
            .collect::<Vec<_>>();

        let (masks, iou_predictions) = self.sam.forward(&image_tensor, &points, true)?;
        let candidates =
            candidates_from_logits(&masks, &iou_predictions, self.threshold, original_size)?;

        Ok(SegmentationResponse {
            candidates,
            original_size,
            reshaped_input_size,
        })
    }

    fn image_to_tensor(&self, image: &RgbImage) -> anyhow::Result<(Tensor, (u32, u32))> {
        let (width, height) = reshaped_size(image.width(), image.height(), sam::IMAGE_SIZE as u32);
        let image = image::imageops::resize(image, width, height, FilterType::CatmullRom);
        let tensor = backdrop_common::rgb_to_tensor(&image, &self.device)?;
        Ok((tensor, (width, height)))
    }
}

impl Segmenter for SegmentAnything {
    fn segment(
        &self,
        request: SegmentationRequest<'_>,
    ) -> Result<SegmentationResponse, CapabilityError> {
        Ok(self.segment_points(request.image, request.points)?)
    }
}

/// The size SAM sees an image at: the longest side scaled to `longest`, keeping the aspect ratio.
fn reshaped_size(width: u32, height: u32, longest: u32) -> (u32, u32) {
    if height < width {
        (longest, (longest * height) / width)
    } else {
        ((longest * width) / height, longest)
    }
}

/// Threshold SAM's `(candidates, height, width)` mask logits and scale each mask back to
/// `original_size`, pairing it with its IoU prediction.
fn candidates_from_logits(
    masks: &Tensor,
    iou_predictions: &Tensor,
    threshold: f32,
    original_size: (u32, u32),
) -> anyhow::Result<Vec<MaskCandidate>> {
    let (count, h, w) = masks.dims3()?;
    let scores = iou_predictions
        .flatten_all()?
        .to_dtype(DType::F32)?
        .to_vec1::<f32>()?;
    if scores.len() != count {
        anyhow::bail!(
            "SAM returned {count} masks but {} iou predictions",
            scores.len()
        );
    }

    let selected = masks.ge(threshold)?;
    let mut candidates = Vec::with_capacity(count);
    for (i, iou_score) in scores.into_iter().enumerate() {
        let pixels = (selected.get(i)?.flatten_all()? * 255.)?
            .to_dtype(DType::U8)?
            .to_vec1::<u8>()?;
        let mask = match GrayImage::from_raw(w as u32, h as u32, pixels) {
            Some(mask) => mask,
            None => anyhow::bail!("error creating mask image"),
        };
        let mask = image::imageops::resize(
            &mask,
            original_size.0,
            original_size.1,
            FilterType::Nearest,
        );
        candidates.push(MaskCandidate {
            mask: SelectionMask::from_luma(&mask, 127),
            iou_score,
        });
    }
    tracing::trace!(
        "iou predictions: {:?}",
        candidates.iter().map(|c| c.iou_score).collect::<Vec<_>>()
    );

    Ok(candidates)
}
