//! Command line arguments for `backdrop`.

use std::path::PathBuf;

use backdrop_vision::{Point, PromptBundle};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use crate::config::PromptDefaults;

/// Keep the subject of a photo and replace everything around it
#[derive(Parser, Debug)]
#[command(name = "backdrop", version, author)]
pub struct Cli {
    /// The photo to edit
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// A pixel on the subject, in the 512x512 working resolution (repeatable)
    #[arg(long = "point", value_name = "X,Y", required = true)]
    pub points: Vec<Point>,

    /// What to generate around the subject
    #[arg(long, required_unless_present = "mask_only")]
    pub prompt: Option<String>,

    /// What the generated background should not look like
    #[arg(long)]
    pub negative_prompt: Option<String>,

    /// Seed for the random generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// How closely to follow the prompt
    #[arg(long)]
    pub guidance_scale: Option<f64>,

    /// A TOML config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Where to write mask.png, result.png and grid.png
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Only segment the subject and write the mask
    #[arg(long)]
    pub mask_only: bool,

    /// Verbose logging (can be repeated: -v, -vv)
    #[arg(short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// The prompt to inpaint with, falling back to the config for anything not given on the
    /// command line. `None` without a prompt.
    pub fn prompt_bundle(&self, defaults: &PromptDefaults) -> Option<PromptBundle> {
        let prompt = self.prompt.as_ref()?;
        let mut bundle = PromptBundle::new(prompt.clone())
            .with_seed(self.seed.unwrap_or(defaults.seed))
            .with_guidance_scale(self.guidance_scale.unwrap_or(defaults.guidance_scale));
        if let Some(negative_prompt) = self
            .negative_prompt
            .as_ref()
            .or(defaults.negative_prompt.as_ref())
        {
            bundle = bundle.with_negative_prompt(negative_prompt.clone());
        }
        Some(bundle)
    }
}

/// The default log level for a `-v` count
pub fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
