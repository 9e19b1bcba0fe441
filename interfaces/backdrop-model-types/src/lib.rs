//! Common types shared by the backdrop model crates and the pipeline that drives them.

#![warn(missing_docs)]

mod builder;
pub use builder::*;
mod source;
pub use source::*;

/// The progress starting a model
#[derive(Clone, Debug)]
pub enum ModelLoadingProgress {
    /// The model is downloading
    Downloading {
        /// The source of the download. This is not a path or URL, but a description of the source
        source: String,
        /// The progress of the file being downloaded
        progress: FileLoadingProgress,
    },
    /// The model is loading
    Loading {
        /// The progress of the loading, from 0 to 1
        progress: f32,
    },
}

/// The progress of a file download
#[derive(Clone, Debug)]
pub struct FileLoadingProgress {
    /// The time stamp the download started
    pub start_time: std::time::Instant,
    /// The size of the cached part of the download in bytes
    pub cached_size: u64,
    /// The size of the download in bytes
    pub size: u64,
    /// The progress of the download in bytes, from 0 to size
    pub progress: u64,
}

impl ModelLoadingProgress {
    /// Create a new downloading progress
    pub fn downloading(source: String, file_loading_progress: FileLoadingProgress) -> Self {
        Self::Downloading {
            source,
            progress: file_loading_progress,
        }
    }

    /// Create a closure that maps file progress for `source` into model progress
    pub fn downloading_progress(
        source: String,
    ) -> impl FnMut(FileLoadingProgress) -> Self + Send + Sync {
        move |progress| ModelLoadingProgress::downloading(source.clone(), progress)
    }

    /// Create a new loading progress
    pub fn loading(progress: f32) -> Self {
        Self::Loading { progress }
    }

    /// Return the fraction complete, from 0 to 1
    pub fn progress(&self) -> f32 {
        match self {
            Self::Downloading {
                progress:
                    FileLoadingProgress {
                        progress,
                        size,
                        cached_size,
                        ..
                    },
                ..
            } => {
                let remaining = size.saturating_sub(*cached_size);
                if remaining == 0 {
                    return 1.;
                }
                progress.saturating_sub(*cached_size) as f32 / remaining as f32
            }
            Self::Loading { progress } => *progress,
        }
    }

    /// Try to estimate the time remaining for a download
    pub fn estimate_time_remaining(&self) -> Option<std::time::Duration> {
        match self {
            Self::Downloading {
                progress: FileLoadingProgress { start_time, .. },
                ..
            } => {
                let progress = self.progress();
                if progress <= 0. {
                    return None;
                }
                let elapsed = start_time.elapsed().as_secs_f32();
                let remaining = elapsed / progress - elapsed;
                Some(std::time::Duration::from_secs_f32(remaining.max(0.)))
            }
            _ => None,
        }
    }

    #[cfg(feature = "loading-progress-bar")]
    /// A terminal progress indicator with one bar per downloaded file
    pub fn multi_bar_loading_indicator() -> impl FnMut(ModelLoadingProgress) + Send + Sync + 'static
    {
        use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
        use std::collections::HashMap;
        let m = MultiProgress::new();
        let sty = ProgressStyle::with_template(
            "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] ({decimal_bytes_per_sec}, ETA {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        let mut progress_bars = HashMap::new();

        move |progress| match progress {
            Self::Downloading {
                source,
                progress:
                    FileLoadingProgress {
                        progress,
                        size,
                        cached_size,
                        ..
                    },
            } => {
                let progress_bar = progress_bars.entry(source.clone()).or_insert_with(|| {
                    let pb = m.add(ProgressBar::new(size));
                    pb.set_message(format!("Downloading {source}"));
                    pb.set_style(sty.clone());
                    pb.set_position(cached_size);
                    pb
                });

                progress_bar.set_position(progress);
            }
            ModelLoadingProgress::Loading { progress } => {
                for pb in progress_bars.values_mut() {
                    pb.finish();
                }
                let progress = progress * 100.;
                let _ = m.println(format!("Loading {progress:.2}%"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn file_progress(progress: u64, cached_size: u64, size: u64) -> FileLoadingProgress {
        FileLoadingProgress {
            start_time: Instant::now(),
            cached_size,
            size,
            progress,
        }
    }

    #[test]
    fn download_progress_ignores_cached_bytes() {
        let progress = ModelLoadingProgress::downloading("unet".into(), file_progress(60, 20, 100));
        assert!((progress.progress() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn fully_cached_download_is_complete() {
        let progress = ModelLoadingProgress::downloading("vae".into(), file_progress(10, 10, 10));
        assert_eq!(progress.progress(), 1.);
    }

    #[test]
    fn loading_progress_passes_through() {
        assert_eq!(ModelLoadingProgress::loading(0.25).progress(), 0.25);
        assert!(ModelLoadingProgress::loading(0.25)
            .estimate_time_remaining()
            .is_none());
    }

    #[test]
    fn no_estimate_before_any_bytes_arrive() {
        let progress = ModelLoadingProgress::downloading("clip".into(), file_progress(0, 0, 100));
        assert!(progress.estimate_time_remaining().is_none());
    }

    #[test]
    fn estimate_is_bounded_by_elapsed_ratio() {
        let mut file = file_progress(50, 0, 100);
        file.start_time = Instant::now() - Duration::from_secs(10);
        let progress = ModelLoadingProgress::downloading("clip".into(), file);
        let remaining = progress.estimate_time_remaining().unwrap();
        assert!(remaining >= Duration::from_secs(9) && remaining <= Duration::from_secs(11));
    }

    #[test]
    fn downloading_progress_closure_tags_source() {
        let mut map = ModelLoadingProgress::downloading_progress("tokenizer".into());
        match map(file_progress(1, 0, 2)) {
            ModelLoadingProgress::Downloading { source, .. } => assert_eq!(source, "tokenizer"),
            other => panic!("unexpected progress {other:?}"),
        }
    }
}
