//! Helpers shared by the backdrop model crates: device selection, the weight cache and
//! conversions between [`image`] buffers and candle tensors.

use std::sync::OnceLock;

use candle_core::{utils::*, Device};

mod cache;
pub use cache::*;
mod tensor;
pub use tensor::*;

pub use backdrop_model_types::{FileLoadingProgress, FileSource, ModelLoadingProgress};

/// Create a candle device that uses any available accelerator.
pub fn accelerated_device_if_available() -> candle_core::Result<Device> {
    static DEVICE: OnceLock<Device> = OnceLock::new();
    if let Some(device) = DEVICE.get() {
        return Ok(device.clone());
    }
    let device = if cuda_is_available() {
        Device::new_cuda(0)?
    } else if metal_is_available() {
        Device::new_metal(0)?
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        tracing::warn!("Running on CPU, to run on GPU(metal), build with `--features metal`");
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        tracing::warn!("Running on CPU, to run on GPU, build with `--features cuda`");
        Device::Cpu
    };
    let _ = DEVICE.set(device.clone());
    Ok(device)
}

/// Pick the device a model should run on. `cpu` forces the CPU even if an accelerator exists.
pub fn device(cpu: bool) -> candle_core::Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        accelerated_device_if_available()
    }
}

/// Resolve a file source to a local path using the default cache, reporting progress as
/// [`ModelLoadingProgress::Downloading`] events labelled with `label`.
pub async fn download(
    cache: &Cache,
    label: &str,
    source: &FileSource,
    progress_handler: &mut (impl FnMut(ModelLoadingProgress) + Send + Sync),
) -> Result<std::path::PathBuf, CacheError> {
    let description = format!("{label} ({source})");
    tracing::debug!("resolving {description}");
    let mut tag = ModelLoadingProgress::downloading_progress(description);
    cache
        .get(source, |progress| progress_handler(tag(progress)))
        .await
}
