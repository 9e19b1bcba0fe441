//! The `backdrop` TOML config file. Every field is optional.
//!
//! ```toml
//! cache_dir = "/data/models"
//!
//! [segmentation]
//! model = "tiny"
//! threshold = 0.5
//!
//! [inpainting]
//! version = "v1-5"
//! n_steps = 50
//!
//! [defaults]
//! seed = 1234
//! negative_prompt = "artifacts, low quality, distortion"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use backdrop_common::Cache;
use backdrop_vision::{DEFAULT_GUIDANCE_SCALE, DEFAULT_SEED};
use rinpaint::{InpaintVersion, StableDiffusionInpaint, StableDiffusionInpaintBuilder};
use rsam::{SegmentAnything, SegmentAnythingBuilder, SegmentAnythingSource};
use serde::{Deserialize, Deserializer};

/// Settings for the models and the default prompt.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackdropConfig {
    /// Where model weights are downloaded to
    pub cache_dir: Option<PathBuf>,
    /// A Hugging Face token for gated repos
    pub huggingface_token: Option<String>,
    pub segmentation: SegmentationConfig,
    pub inpainting: InpaintingConfig,
    pub defaults: PromptDefaults,
}

impl BackdropConfig {
    /// Read a config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// The weight cache both models download into.
    pub fn cache(&self) -> Cache {
        let cache = match &self.cache_dir {
            Some(dir) => Cache::new(dir.clone()),
            None => Cache::default(),
        };
        cache.with_huggingface_token(self.huggingface_token.clone())
    }
}

/// Which SAM checkpoint to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamModel {
    Tiny,
    #[default]
    Medium,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationConfig {
    pub model: SamModel,
    /// Local SAM weights to use instead of downloading them
    pub weights: Option<PathBuf>,
    pub cpu: bool,
    pub threshold: f32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model: SamModel::Medium,
            weights: None,
            cpu: false,
            threshold: 0.,
        }
    }
}

impl SegmentationConfig {
    /// A builder for the configured SAM model
    pub fn builder(&self, cache: Cache) -> SegmentAnythingBuilder {
        let tiny = self.model == SamModel::Tiny;
        let source = match (&self.weights, tiny) {
            (Some(weights), tiny) => SegmentAnythingSource::local(weights, tiny),
            (None, true) => SegmentAnythingSource::tiny(),
            (None, false) => SegmentAnythingSource::medium(),
        };
        SegmentAnything::builder()
            .source(source)
            .cpu(self.cpu)
            .threshold(self.threshold)
            .cache(cache)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InpaintingConfig {
    #[serde(deserialize_with = "inpaint_version")]
    pub version: InpaintVersion,
    pub n_steps: usize,
    pub use_f16: bool,
    pub cpu: bool,
}

impl Default for InpaintingConfig {
    fn default() -> Self {
        Self {
            version: InpaintVersion::default(),
            n_steps: 30,
            use_f16: false,
            cpu: false,
        }
    }
}

impl InpaintingConfig {
    /// A builder for the configured inpainting model
    pub fn builder(&self, cache: Cache) -> StableDiffusionInpaintBuilder {
        StableDiffusionInpaint::builder()
            .with_version(self.version)
            .with_n_steps(self.n_steps)
            .with_f16(self.use_f16)
            .with_cpu(self.cpu)
            .with_cache(cache)
    }
}

fn inpaint_version<'de, D: Deserializer<'de>>(deserializer: D) -> Result<InpaintVersion, D::Error> {
    let version = String::deserialize(deserializer)?;
    version.parse().map_err(serde::de::Error::custom)
}

/// Prompt settings used when they are not given on the command line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptDefaults {
    pub seed: u64,
    pub guidance_scale: f64,
    pub negative_prompt: Option<String>,
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            negative_prompt: None,
        }
    }
}
