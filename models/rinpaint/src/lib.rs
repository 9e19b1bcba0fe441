//! # RInpaint
//!
//! Text conditioned [Stable Diffusion](https://huggingface.co/docs/diffusers/using-diffusers/inpaint)
//! inpainting for backdrop, implemented in the [Candle](https://github.com/huggingface/candle) ML
//! framework.
//!
//! [`StableDiffusionInpaint`] implements [`Inpainter`]: the white part of the mask is regenerated
//! from the prompt and the black part is kept.
//!
//! ## Usage
//!
//! ```rust, no_run
//! use backdrop_vision::*;
//! use rinpaint::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let model = StableDiffusionInpaint::builder().build().await?;
//!     let image = load_image("car.png")?;
//!     let mask = Mask::from_fn(512, 512, |_, y| {
//!         if y > 300 { Region::Subject } else { Region::Fill }
//!     });
//!     let prompt = PromptBundle::new("a car driving on Mars. Studio lights, 1970s");
//!     let result = InpaintAdapter::new(&model).inpaint(&image, &mask, &prompt)?;
//!     result.save("mars.png")?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

use anyhow::{Error as E, Result};
use backdrop_common::{Cache, FileSource, ModelLoadingProgress};
use backdrop_model_types::ModelBuilder;
use backdrop_vision::{CapabilityError, InpaintRequest, Inpainter};
use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use image::{imageops::FilterType, GrayImage, RgbImage};
use rand::Rng;
use rand_distr::StandardNormal;
use tokenizers::Tokenizer;

/// Inpainting UNets take the noisy latents, the mask and the masked image latents.
const UNET_IN_CHANNELS: usize = 9;
const LATENT_CHANNELS: usize = 4;
const LATENT_SCALE: u32 = 8;

/// The Stable Diffusion inpainting checkpoint to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InpaintVersion {
    /// Stable Diffusion 1.5 inpainting
    V1_5,
    /// Stable Diffusion 2 inpainting
    V2,
    /// Stable Diffusion XL 1.0 inpainting
    #[default]
    Xl,
}

impl InpaintVersion {
    fn repo(&self) -> &'static str {
        match self {
            Self::V1_5 => "stable-diffusion-v1-5/stable-diffusion-inpainting",
            Self::V2 => "stabilityai/stable-diffusion-2-inpainting",
            Self::Xl => "diffusers/stable-diffusion-xl-1.0-inpainting-0.1",
        }
    }

    /// The base model config. Inpainting checkpoints only differ in the input channels of the
    /// UNet, which are set when it is built.
    fn config(&self, sliced_attention_size: Option<usize>) -> StableDiffusionConfig {
        match self {
            Self::V1_5 => StableDiffusionConfig::v1_5(sliced_attention_size, None, None),
            Self::V2 => StableDiffusionConfig::v2_1(sliced_attention_size, None, None),
            Self::Xl => StableDiffusionConfig::sdxl(sliced_attention_size, None, None),
        }
    }

    /// The factor latents are scaled by before they reach the UNet.
    pub fn vae_scale(&self) -> f64 {
        match self {
            Self::V1_5 | Self::V2 => 0.18215,
            Self::Xl => 0.13025,
        }
    }

    fn has_second_text_encoder(&self) -> bool {
        matches!(self, Self::Xl)
    }

    fn files(&self) -> &'static [ModelFile] {
        if self.has_second_text_encoder() {
            &[
                ModelFile::Tokenizer,
                ModelFile::Tokenizer2,
                ModelFile::Clip,
                ModelFile::Clip2,
                ModelFile::Unet,
                ModelFile::Vae,
            ]
        } else {
            &[
                ModelFile::Tokenizer,
                ModelFile::Clip,
                ModelFile::Unet,
                ModelFile::Vae,
            ]
        }
    }
}

impl std::str::FromStr for InpaintVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1-5" | "v1.5" | "1.5" => Ok(Self::V1_5),
            "v2" | "2" => Ok(Self::V2),
            "xl" | "sdxl" => Ok(Self::Xl),
            _ => Err(format!(
                "unknown inpainting model {s:?}, expected one of v1-5, v2 or xl"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelFile {
    Tokenizer,
    Tokenizer2,
    Clip,
    Clip2,
    Unet,
    Vae,
}

impl ModelFile {
    fn get(&self, version: InpaintVersion, use_f16: bool, filename: Option<String>) -> FileSource {
        self.source(version, use_f16).or_local(filename)
    }

    fn source(&self, version: InpaintVersion, use_f16: bool) -> FileSource {
        let weights = |prefix: &str, name: &str| {
            if use_f16 {
                format!("{prefix}/{name}.fp16.safetensors")
            } else {
                format!("{prefix}/{name}.safetensors")
            }
        };
        let (repo, path) = match self {
            ModelFile::Tokenizer => {
                let repo = match version {
                    InpaintVersion::V1_5 | InpaintVersion::V2 => "openai/clip-vit-base-patch32",
                    InpaintVersion::Xl => "openai/clip-vit-large-patch14",
                };
                (repo, "tokenizer.json".to_string())
            }
            ModelFile::Tokenizer2 => (
                "laion/CLIP-ViT-bigG-14-laion2B-39B-b160k",
                "tokenizer.json".to_string(),
            ),
            ModelFile::Clip => (version.repo(), weights("text_encoder", "model")),
            ModelFile::Clip2 => (version.repo(), weights("text_encoder_2", "model")),
            ModelFile::Unet => (version.repo(), weights("unet", "diffusion_pytorch_model")),
            // The XL vae overflows in f16 unless it is the patched one
            ModelFile::Vae if version == InpaintVersion::Xl && use_f16 => (
                "madebyollin/sdxl-vae-fp16-fix",
                "diffusion_pytorch_model.safetensors".to_string(),
            ),
            ModelFile::Vae => (version.repo(), weights("vae", "diffusion_pytorch_model")),
        };
        FileSource::huggingface_main(repo.to_owned(), path)
    }

    fn label(&self) -> &'static str {
        match self {
            ModelFile::Tokenizer => "Tokenizer",
            ModelFile::Tokenizer2 => "Tokenizer 2",
            ModelFile::Clip => "Text encoder",
            ModelFile::Clip2 => "Text encoder 2",
            ModelFile::Unet => "UNet",
            ModelFile::Vae => "VAE",
        }
    }
}

/// A builder for [`StableDiffusionInpaint`].
pub struct StableDiffusionInpaintBuilder {
    version: InpaintVersion,

    /// The number of denoising steps.
    n_steps: usize,

    use_f16: bool,

    use_flash_attn: bool,

    cpu: bool,

    /// The size of the sliced attention or `None` for automatic slicing.
    sliced_attention_size: Option<usize>,

    /// Keep the unmasked pixels of the input exactly instead of their VAE reconstruction.
    preserve_unmasked: bool,

    /// The UNet weight file, in .safetensors format.
    unet_weights: Option<String>,

    /// The VAE weight file, in .safetensors format.
    vae_weights: Option<String>,

    /// The CLIP weight file, in .safetensors format.
    clip_weights: Option<String>,

    /// The second CLIP weight file used by XL, in .safetensors format.
    clip2_weights: Option<String>,

    /// The file specifying the tokenizer used for tokenization.
    tokenizer: Option<String>,

    /// The file specifying the tokenizer used by the second text encoder.
    tokenizer2: Option<String>,

    cache: Cache,
}

impl Default for StableDiffusionInpaintBuilder {
    fn default() -> Self {
        Self {
            version: InpaintVersion::default(),
            n_steps: 30,
            use_f16: false,
            use_flash_attn: { cfg!(feature = "flash-attn") },
            cpu: false,
            sliced_attention_size: None,
            preserve_unmasked: true,
            unet_weights: None,
            vae_weights: None,
            clip_weights: None,
            clip2_weights: None,
            tokenizer: None,
            tokenizer2: None,
            cache: Cache::default(),
        }
    }
}

impl StableDiffusionInpaintBuilder {
    /// Set the checkpoint to run.
    pub fn with_version(mut self, version: InpaintVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the number of denoising steps.
    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    /// Load the half precision weights and run in f16 on accelerators.
    pub fn with_f16(mut self, use_f16: bool) -> Self {
        self.use_f16 = use_f16;
        self
    }

    /// Set whether to use the Flash Attention implementation.
    pub fn with_flash_attn(mut self, use_flash_attn: bool) -> Self {
        self.use_flash_attn = use_flash_attn;
        self
    }

    /// Set to true to run the model on CPU.
    pub fn with_cpu(mut self, cpu: bool) -> Self {
        self.cpu = cpu;
        self
    }

    /// Set the size of the sliced attention.
    pub fn with_sliced_attention_size(mut self, size: usize) -> Self {
        self.sliced_attention_size = Some(size);
        self
    }

    /// Set whether the pixels outside the mask are copied from the input unchanged (the default).
    pub fn with_preserve_unmasked(mut self, preserve_unmasked: bool) -> Self {
        self.preserve_unmasked = preserve_unmasked;
        self
    }

    /// Set the UNet weight file, in .safetensors format.
    pub fn with_unet_weights(mut self, unet_weights: impl Into<String>) -> Self {
        self.unet_weights = Some(unet_weights.into());
        self
    }

    /// Set the VAE weight file, in .safetensors format.
    pub fn with_vae_weights(mut self, vae_weights: impl Into<String>) -> Self {
        self.vae_weights = Some(vae_weights.into());
        self
    }

    /// Set the CLIP weight file, in .safetensors format.
    pub fn with_clip_weights(mut self, clip_weights: impl Into<String>) -> Self {
        self.clip_weights = Some(clip_weights.into());
        self
    }

    /// Set the second CLIP weight file used by XL, in .safetensors format.
    pub fn with_clip2_weights(mut self, clip2_weights: impl Into<String>) -> Self {
        self.clip2_weights = Some(clip2_weights.into());
        self
    }

    /// Set the file specifying the tokenizer used for tokenization.
    pub fn with_tokenizer(mut self, tokenizer: impl Into<String>) -> Self {
        self.tokenizer = Some(tokenizer.into());
        self
    }

    /// Set the file specifying the tokenizer used by the second text encoder.
    pub fn with_tokenizer2(mut self, tokenizer2: impl Into<String>) -> Self {
        self.tokenizer2 = Some(tokenizer2.into());
        self
    }

    /// Set the cache the weights are downloaded into.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache;
        self
    }

    fn source(&self, file: ModelFile) -> FileSource {
        let filename = match file {
            ModelFile::Tokenizer => &self.tokenizer,
            ModelFile::Tokenizer2 => &self.tokenizer2,
            ModelFile::Clip => &self.clip_weights,
            ModelFile::Clip2 => &self.clip2_weights,
            ModelFile::Unet => &self.unet_weights,
            ModelFile::Vae => &self.vae_weights,
        };
        file.get(self.version, self.use_f16, filename.clone())
    }

    /// Build the model.
    pub async fn build(self) -> Result<StableDiffusionInpaint> {
        self.build_with_loading_handler(|_| {}).await
    }

    /// Build the model with a handler for progress as the download and loading progresses.
    pub async fn build_with_loading_handler(
        self,
        progress_handler: impl FnMut(ModelLoadingProgress) + Send + Sync + 'static,
    ) -> Result<StableDiffusionInpaint> {
        StableDiffusionInpaint::new(self, progress_handler).await
    }
}

#[async_trait::async_trait]
impl ModelBuilder for StableDiffusionInpaintBuilder {
    type Model = StableDiffusionInpaint;
    type Error = anyhow::Error;

    async fn start_with_loading_handler(
        self,
        handler: impl FnMut(ModelLoadingProgress) + Send + Sync + 'static,
    ) -> anyhow::Result<Self::Model> {
        self.build_with_loading_handler(handler).await
    }

    fn requires_download(&self) -> bool {
        self.version
            .files()
            .iter()
            .any(|file| !self.cache.exists(&self.source(*file)))
    }
}

/// A CLIP text encoder with its tokenizer.
struct TextEncoder {
    tokenizer: Tokenizer,
    clip: ClipTextTransformer,
    config: stable_diffusion::clip::Config,
}

impl TextEncoder {
    fn encode(&self, prompt: &str, device: &Device) -> Result<Tensor> {
        let tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(E::msg)?
            .get_ids()
            .to_vec();
        let pad_token = self.config.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = *self
            .tokenizer
            .get_vocab(true)
            .get(pad_token)
            .ok_or_else(|| E::msg(format!("the tokenizer has no {pad_token} token")))?;
        let max_len = self.config.max_position_embeddings;
        if tokens.len() > max_len {
            tracing::warn!(
                "prompt is {} tokens long, only the first {max_len} are used",
                tokens.len()
            );
        }
        let tokens = pad_tokens(tokens, max_len, pad_id);
        let tokens = Tensor::new(tokens.as_slice(), device)?.unsqueeze(0)?;
        Ok(self.clip.forward(&tokens)?)
    }
}

/// Pad `tokens` to exactly `len` with `pad_id`. Longer sequences are cut but keep their final
/// (end of text) token.
fn pad_tokens(mut tokens: Vec<u32>, len: usize, pad_id: u32) -> Vec<u32> {
    if tokens.len() > len {
        let last = tokens[tokens.len() - 1];
        tokens.truncate(len.saturating_sub(1));
        tokens.push(last);
    }
    tokens.resize(len, pad_id);
    tokens
}

/// A Stable Diffusion inpainting pipeline.
pub struct StableDiffusionInpaint {
    version: InpaintVersion,
    config: StableDiffusionConfig,
    n_steps: usize,
    preserve_unmasked: bool,
    text_encoder: TextEncoder,
    text_encoder_2: Option<TextEncoder>,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
    dtype: DType,
    device: Device,
}

impl StableDiffusionInpaint {
    /// Create a new builder for the inpainting model.
    pub fn builder() -> StableDiffusionInpaintBuilder {
        StableDiffusionInpaintBuilder::default()
    }

    async fn new(
        settings: StableDiffusionInpaintBuilder,
        mut progress_handler: impl FnMut(ModelLoadingProgress) + Send + Sync + 'static,
    ) -> Result<Self> {
        let mut paths = Vec::new();
        for file in settings.version.files() {
            let source = settings.source(*file);
            let path = backdrop_common::download(
                &settings.cache,
                file.label(),
                &source,
                &mut progress_handler,
            )
            .await?;
            paths.push((*file, path));
        }
        let path = |file: ModelFile| {
            paths
                .iter()
                .find(|(f, _)| *f == file)
                .map(|(_, path)| path.clone())
                .ok_or_else(|| E::msg(format!("{} was not downloaded", file.label())))
        };

        let StableDiffusionInpaintBuilder {
            version,
            n_steps,
            use_f16,
            use_flash_attn,
            cpu,
            sliced_attention_size,
            preserve_unmasked,
            ..
        } = settings;

        let device = backdrop_common::device(cpu)?;
        let dtype = if use_f16 && !device.is_cpu() {
            DType::F16
        } else {
            if use_f16 {
                tracing::warn!("f16 is not supported on CPU, running in f32");
            }
            DType::F32
        };
        let config = version.config(sliced_attention_size);

        progress_handler(ModelLoadingProgress::loading(0.));
        let text_encoder = TextEncoder {
            tokenizer: Tokenizer::from_file(path(ModelFile::Tokenizer)?).map_err(E::msg)?,
            clip: stable_diffusion::build_clip_transformer(
                &config.clip,
                path(ModelFile::Clip)?,
                &device,
                DType::F32,
            )?,
            config: config.clip.clone(),
        };
        let text_encoder_2 = match &config.clip2 {
            Some(clip2_config) if version.has_second_text_encoder() => Some(TextEncoder {
                tokenizer: Tokenizer::from_file(path(ModelFile::Tokenizer2)?).map_err(E::msg)?,
                clip: stable_diffusion::build_clip_transformer(
                    clip2_config,
                    path(ModelFile::Clip2)?,
                    &device,
                    DType::F32,
                )?,
                config: clip2_config.clone(),
            }),
            _ => None,
        };
        progress_handler(ModelLoadingProgress::loading(0.25));

        let vae = config.build_vae(path(ModelFile::Vae)?, &device, dtype)?;
        progress_handler(ModelLoadingProgress::loading(0.4));

        let unet = config.build_unet(
            path(ModelFile::Unet)?,
            &device,
            UNET_IN_CHANNELS,
            use_flash_attn,
            dtype,
        )?;
        progress_handler(ModelLoadingProgress::loading(1.));
        tracing::debug!("loaded {version:?} inpainting in {dtype:?} on {device:?}");

        Ok(Self {
            version,
            config,
            n_steps,
            preserve_unmasked,
            text_encoder,
            text_encoder_2,
            unet,
            vae,
            dtype,
            device,
        })
    }

    /// The checkpoint this pipeline runs.
    pub fn version(&self) -> InpaintVersion {
        self.version
    }

    fn text_embeddings(&self, prompt: &str, uncond_prompt: Option<&str>) -> Result<Tensor> {
        let encoders = std::iter::once(&self.text_encoder).chain(self.text_encoder_2.as_ref());
        let mut embeddings = Vec::new();
        for encoder in encoders {
            let text = encoder.encode(prompt, &self.device)?;
            let text = match uncond_prompt {
                None => text,
                Some(uncond_prompt) => {
                    let uncond = encoder.encode(uncond_prompt, &self.device)?;
                    Tensor::cat(&[uncond, text], 0)?
                }
            };
            embeddings.push(text);
        }
        Ok(Tensor::cat(&embeddings, D::Minus1)?.to_dtype(self.dtype)?)
    }

    /// Regenerate the white part of `request.mask` from the prompt.
    pub fn run(&self, request: InpaintRequest<'_>) -> Result<RgbImage> {
        let (width, height) = request.image.dimensions();
        validate_dimensions(request.image, request.mask)?;

        let seed = request.generator.seed();
        // The CPU backend cannot be seeded, there only the initial latents are reproducible
        if !self.device.is_cpu() {
            self.device.set_seed(seed)?;
        }
        let use_guidance = request.guidance_scale > 1.;
        let uncond_prompt = use_guidance.then(|| request.negative_prompt.unwrap_or(""));
        let text_embeddings = self.text_embeddings(request.prompt, uncond_prompt)?;
        let vae_scale = self.version.vae_scale();

        // Pixels in [-1, 1], with the region to regenerate blanked out
        let image = backdrop_common::rgb_to_tensor(request.image, &self.device)?
            .to_dtype(DType::F32)?
            .affine(2. / 255., -1.)?
            .unsqueeze(0)?;
        let mask = backdrop_common::luma_to_binary_tensor(request.mask, &self.device)?;
        let masked_image = image
            .broadcast_mul(&mask.affine(-1., 1.)?)?
            .to_dtype(self.dtype)?;
        let masked_image_latents = (self.vae.encode(&masked_image)?.sample()? * vae_scale)?;

        let latent_mask = image::imageops::resize(
            request.mask,
            width / LATENT_SCALE,
            height / LATENT_SCALE,
            FilterType::Nearest,
        );
        let latent_mask =
            backdrop_common::luma_to_binary_tensor(&latent_mask, &self.device)?.to_dtype(self.dtype)?;
        let (latent_mask, masked_image_latents) = if use_guidance {
            (
                Tensor::cat(&[&latent_mask, &latent_mask], 0)?,
                Tensor::cat(&[&masked_image_latents, &masked_image_latents], 0)?,
            )
        } else {
            (latent_mask, masked_image_latents)
        };

        let mut scheduler = self.config.build_scheduler(self.n_steps)?;
        let timesteps = scheduler.timesteps().to_vec();
        let latents = initial_noise(
            &mut request.generator.rng(),
            (
                1,
                LATENT_CHANNELS,
                (height / LATENT_SCALE) as usize,
                (width / LATENT_SCALE) as usize,
            ),
            &self.device,
        )?;
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        for (step, &timestep) in timesteps.iter().enumerate() {
            let latent_model_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let latent_model_input = scheduler.scale_model_input(latent_model_input, timestep)?;
            let latent_model_input =
                Tensor::cat(&[&latent_model_input, &latent_mask, &masked_image_latents], 1)?;

            let noise_pred =
                self.unet
                    .forward(&latent_model_input, timestep as f64, &text_embeddings)?;
            let noise_pred = if use_guidance {
                let noise_pred = noise_pred.chunk(2, 0)?;
                let (noise_pred_uncond, noise_pred_text) = (&noise_pred[0], &noise_pred[1]);
                (noise_pred_uncond
                    + ((noise_pred_text - noise_pred_uncond)? * request.guidance_scale)?)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            tracing::trace!("step {}/{} done (t: {timestep})", step + 1, timesteps.len());
        }

        let image = self.vae.decode(&(&latents / vae_scale)?)?;
        let image = ((image / 2.)? + 0.5)?
            .to_dtype(DType::F32)?
            .clamp(0f32, 1f32)?;
        let image = (image * 255.)?.to_dtype(DType::U8)?.i(0)?;
        let generated = backdrop_common::tensor_to_rgb(&image)?;

        if self.preserve_unmasked {
            Ok(composite(request.image, &generated, request.mask))
        } else {
            Ok(generated)
        }
    }
}

impl Inpainter for StableDiffusionInpaint {
    fn inpaint(&self, request: InpaintRequest<'_>) -> std::result::Result<RgbImage, CapabilityError> {
        Ok(self.run(request)?)
    }
}

fn validate_dimensions(image: &RgbImage, mask: &GrayImage) -> Result<()> {
    let (width, height) = image.dimensions();
    if width % LATENT_SCALE != 0 || height % LATENT_SCALE != 0 || width == 0 || height == 0 {
        anyhow::bail!("image size must be a non zero multiple of {LATENT_SCALE}, got {width}x{height}");
    }
    if mask.dimensions() != (width, height) {
        anyhow::bail!(
            "mask is {:?} but the image is {width}x{height}",
            mask.dimensions()
        );
    }
    Ok(())
}

/// Standard normal noise drawn from `rng`, so the same seed gives the same latents on every device.
fn initial_noise(
    rng: &mut impl Rng,
    shape: (usize, usize, usize, usize),
    device: &Device,
) -> Result<Tensor> {
    let (b, c, h, w) = shape;
    let noise = (0..b * c * h * w)
        .map(|_| rng.sample::<f32, _>(StandardNormal))
        .collect::<Vec<_>>();
    Ok(Tensor::from_vec(noise, shape, device)?)
}

/// Take the white pixels of `mask` from `generated` and the rest from `original`.
fn composite(original: &RgbImage, generated: &RgbImage, mask: &GrayImage) -> RgbImage {
    RgbImage::from_fn(original.width(), original.height(), |x, y| {
        if mask.get_pixel(x, y).0[0] >= 128 {
            *generated.get_pixel(x, y)
        } else {
            *original.get_pixel(x, y)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn xl_is_the_default_checkpoint() {
        let builder = StableDiffusionInpaint::builder();
        assert_eq!(builder.version, InpaintVersion::Xl);
        assert_eq!(
            builder.source(ModelFile::Unet).to_string(),
            "hf://diffusers/stable-diffusion-xl-1.0-inpainting-0.1/main/unet/diffusion_pytorch_model.safetensors"
        );
        assert_eq!(InpaintVersion::Xl.files().len(), 6);
        assert_eq!(InpaintVersion::V1_5.files().len(), 4);
    }

    #[test]
    fn f16_picks_the_half_precision_files() {
        let source = ModelFile::Clip.source(InpaintVersion::V2, true);
        assert_eq!(
            source.to_string(),
            "hf://stabilityai/stable-diffusion-2-inpainting/main/text_encoder/model.fp16.safetensors"
        );
        let vae = ModelFile::Vae.source(InpaintVersion::Xl, true);
        assert_eq!(
            vae.to_string(),
            "hf://madebyollin/sdxl-vae-fp16-fix/main/diffusion_pytorch_model.safetensors"
        );
    }

    #[test]
    fn local_weights_override_the_hub() {
        let builder = StableDiffusionInpaint::builder().with_unet_weights("/models/unet.safetensors");
        assert_eq!(
            builder.source(ModelFile::Unet),
            FileSource::local("/models/unet.safetensors")
        );
    }

    #[test]
    fn tokenizers_follow_the_text_encoders() {
        assert_eq!(
            ModelFile::Tokenizer.source(InpaintVersion::V1_5, false).to_string(),
            "hf://openai/clip-vit-base-patch32/main/tokenizer.json"
        );
        assert_eq!(
            ModelFile::Tokenizer2.source(InpaintVersion::Xl, false).to_string(),
            "hf://laion/CLIP-ViT-bigG-14-laion2B-39B-b160k/main/tokenizer.json"
        );
    }

    #[test]
    fn versions_parse_from_config_names() {
        assert_eq!("xl".parse::<InpaintVersion>(), Ok(InpaintVersion::Xl));
        assert_eq!("v1-5".parse::<InpaintVersion>(), Ok(InpaintVersion::V1_5));
        assert_eq!("V2".parse::<InpaintVersion>(), Ok(InpaintVersion::V2));
        assert!("v3".parse::<InpaintVersion>().is_err());
        assert_eq!(InpaintVersion::V1_5.vae_scale(), 0.18215);
    }

    #[test]
    fn tokens_are_padded_and_truncated() {
        assert_eq!(pad_tokens(vec![1, 2], 4, 0), vec![1, 2, 0, 0]);
        assert_eq!(pad_tokens(vec![1, 2, 3, 4, 9], 3, 0), vec![1, 2, 9]);
    }

    #[test]
    fn sizes_must_be_multiples_of_eight() {
        let mask = GrayImage::new(512, 512);
        assert!(validate_dimensions(&RgbImage::new(512, 512), &mask).is_ok());
        assert!(validate_dimensions(&RgbImage::new(510, 512), &GrayImage::new(510, 512)).is_err());
        assert!(validate_dimensions(&RgbImage::new(256, 256), &mask).is_err());
    }

    #[test]
    fn noise_is_reproducible_from_the_seed() {
        let noise = |seed| {
            initial_noise(
                &mut backdrop_vision::Generator::manual_seed(seed).rng(),
                (1, 4, 2, 2),
                &Device::Cpu,
            )
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap()
        };
        assert_eq!(noise(74294536), noise(74294536));
        assert_ne!(noise(74294536), noise(1));
        assert_eq!(noise(1).len(), 16);
    }

    #[test]
    fn only_xl_has_a_second_text_encoder() {
        assert!(InpaintVersion::Xl.config(None).clip2.is_some());
        assert!(InpaintVersion::V1_5.config(None).clip2.is_none());
        assert!(InpaintVersion::V2.config(None).clip2.is_none());
    }

    #[test]
    fn composite_keeps_the_black_part_of_the_mask() {
        let original = RgbImage::from_pixel(2, 1, Rgb([1, 1, 1]));
        let generated = RgbImage::from_pixel(2, 1, Rgb([9, 9, 9]));
        let mask = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 255 }]));
        let result = composite(&original, &generated, &mask);
        assert_eq!(result.get_pixel(0, 0), &Rgb([1, 1, 1]));
        assert_eq!(result.get_pixel(1, 0), &Rgb([9, 9, 9]));
    }
}
