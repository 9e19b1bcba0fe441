use rand::rngs::StdRng;
use rand::SeedableRng;

/// The seed used when none is given, so that runs are repeatable by default
pub const DEFAULT_SEED: u64 = 74294536;

/// The classifier-free guidance scale used when none is given
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.0;

/// What to generate in the region to fill, and how.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBundle {
    prompt: String,
    negative_prompt: Option<String>,
    seed: u64,
    guidance_scale: f64,
}

impl PromptBundle {
    /// Create a new bundle with the default seed and guidance scale
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            seed: DEFAULT_SEED,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
        }
    }

    /// Set what the model should steer away from. A blank prompt clears it.
    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        let negative_prompt = negative_prompt.into();
        self.negative_prompt = (!negative_prompt.trim().is_empty()).then_some(negative_prompt);
        self
    }

    /// Set the seed for the random generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the guidance scale. Higher values follow the prompt more closely, usually at the
    /// expense of image quality.
    pub fn with_guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    /// The prompt
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The negative prompt, if any
    pub fn negative_prompt(&self) -> Option<&str> {
        self.negative_prompt.as_deref()
    }

    /// The seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The guidance scale
    pub fn guidance_scale(&self) -> f64 {
        self.guidance_scale
    }
}

/// A handle to a deterministically seeded random source.
///
/// Model backends that own their own random state (such as a candle device) seed it from
/// [`Generator::seed`]; everything else can draw from [`Generator::rng`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generator {
    seed: u64,
}

impl Generator {
    /// Create a generator seeded with `seed`
    pub fn manual_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// The seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A fresh random number generator. Every call starts from the same state.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}
