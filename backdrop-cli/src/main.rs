//! `backdrop`: keep the subject of a photo and generate a new background around it.

use std::path::Path;

use anyhow::Context;
use backdrop_common::ModelLoadingProgress;
use backdrop_model_types::ModelBuilder;
use backdrop_vision::{
    load_image, make_image_grid, BackdropApp, ForegroundPoints, MaskAdapter, RequestHandler,
    SwapRequest, SwapResponse,
};
use clap::Parser;
use image::DynamicImage;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use cli::{log_level, Cli};
use config::BackdropConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(log_level(cli.verbose).into())
                .from_env_lossy(),
        )
        .init();

    let config = match &cli.config {
        Some(path) => BackdropConfig::load(path)?,
        None => BackdropConfig::default(),
    };
    let cache = config.cache();

    let image = load_image(&cli.image)?;
    let points = ForegroundPoints::new(cli.points.iter().copied())?;
    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("failed to create {}", cli.output_dir.display()))?;

    let builder = config.segmentation.builder(cache.clone());
    if builder.requires_download() {
        tracing::info!("downloading the segmentation model");
    }
    let segmenter = builder
        .build_with_loading_handler(ModelLoadingProgress::multi_bar_loading_indicator())
        .await?;

    if cli.mask_only {
        let mask = MaskAdapter::new(&segmenter).mask(&image, &points)?;
        tracing::info!(
            "subject covers {} pixels, {} will be filled",
            mask.subject_count(),
            mask.fill_count()
        );
        save(&mask.to_overlay().into(), &cli.output_dir.join("mask.png"))?;
        return Ok(());
    }

    let prompt = cli
        .prompt_bundle(&config.defaults)
        .context("a prompt is required unless --mask-only is set")?;

    let builder = config.inpainting.builder(cache);
    if builder.requires_download() {
        tracing::info!("downloading the inpainting model, this can take a while");
    }
    let inpainter = builder
        .build_with_loading_handler(ModelLoadingProgress::multi_bar_loading_indicator())
        .await?;

    let app = BackdropApp::new(segmenter, inpainter);
    tracing::info!("generating \"{}\" with seed {}", prompt.prompt(), prompt.seed());
    let SwapResponse {
        mask,
        overlay,
        result,
    } = app.handle(SwapRequest {
        image: image.clone(),
        points,
        prompt,
    })?;
    tracing::info!(
        "subject covers {} pixels, {} were filled",
        mask.subject_count(),
        mask.fill_count()
    );

    let images = [
        DynamicImage::ImageRgb8(image),
        DynamicImage::ImageRgba8(overlay),
        DynamicImage::ImageRgb8(result),
    ];
    save(&images[1], &cli.output_dir.join("mask.png"))?;
    save(&images[2], &cli.output_dir.join("result.png"))?;
    let grid = make_image_grid(&images, 1, 3)?;
    save(&grid.into(), &cli.output_dir.join("grid.png"))?;

    Ok(())
}

fn save(image: &DynamicImage, path: &Path) -> anyhow::Result<()> {
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}
