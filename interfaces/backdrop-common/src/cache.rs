use backdrop_model_types::{FileLoadingProgress, FileSource};
use httpdate::parse_http_date;
use hf_hub::{Repo, RepoType};
use reqwest::header::{HeaderValue, CONTENT_LENGTH, LAST_MODIFIED, RANGE};
use reqwest::{IntoUrl, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// An error that can occur while resolving a [`FileSource`] to a local file.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The Hugging Face API could not be constructed
    #[error("Hugging Face API error: {0}")]
    HuggingFaceApi(#[from] hf_hub::api::sync::ApiError),
    /// The metadata of a cached file could not be read
    #[error("Unable to get file metadata for {0}: {1}")]
    UnableToGetFileMetadata(PathBuf, #[source] std::io::Error),
    /// A filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A network error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a status other than 200 or 206
    #[error("Unexpected status code: {0}")]
    UnexpectedStatusCode(StatusCode),
    /// No cache directory was configured and none could be derived for this platform
    #[error("No data directory is available for the model cache")]
    NoCacheDirectory,
}

/// A local directory that holds model weights downloaded from Hugging Face.
#[derive(Debug, Clone)]
pub struct Cache {
    location: Option<PathBuf>,
    /// The huggingface token to use (defaults to the token set with `huggingface-cli login`)
    huggingface_token: Option<String>,
}

impl Cache {
    /// Create a new cache with a specific location
    pub fn new(location: PathBuf) -> Self {
        Self {
            location: Some(location),
            huggingface_token: None,
        }
    }

    /// Set the Hugging Face token to use for downloading (defaults to the token set with
    /// `huggingface-cli login`, and then the environment variable `HF_TOKEN`)
    pub fn with_huggingface_token(mut self, token: Option<String>) -> Self {
        self.huggingface_token = token;
        self
    }

    /// The directory files are cached in
    pub fn location(&self) -> Result<&Path, CacheError> {
        self.location.as_deref().ok_or(CacheError::NoCacheDirectory)
    }

    fn cached_path(&self, model_id: &str, revision: &str, file: &str) -> Result<PathBuf, CacheError> {
        Ok(self.location()?.join(model_id).join(revision).join(file))
    }

    /// Check if the file exists locally (if it is a local file or if it has been downloaded)
    pub fn exists(&self, source: &FileSource) -> bool {
        match source {
            FileSource::HuggingFace {
                model_id,
                revision,
                file,
            } => self
                .cached_path(model_id, revision, file)
                .map(|path| path.exists())
                .unwrap_or(false),
            FileSource::Local(path) => path.exists(),
        }
    }

    /// Get the file from the cache, downloading it if necessary
    pub async fn get(
        &self,
        source: &FileSource,
        progress: impl FnMut(FileLoadingProgress),
    ) -> Result<PathBuf, CacheError> {
        let (model_id, revision, file) = match source {
            FileSource::HuggingFace {
                model_id,
                revision,
                file,
            } => (model_id, revision, file),
            FileSource::Local(path) => return Ok(path.clone()),
        };

        let token = self.huggingface_token.clone().or_else(huggingface_token);
        let complete_download = self.cached_path(model_id, revision, file)?;

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
        let url = hf_hub::api::sync::Api::new()?.repo(repo).url(file);
        let client = reqwest::Client::new();
        tracing::trace!("Fetching metadata for {file} from {url}");
        let head = client
            .head(&url)
            .with_authorization_header(token.clone())
            .send()
            .await;

        if complete_download.exists() {
            let metadata = tokio::fs::metadata(&complete_download)
                .await
                .map_err(|e| CacheError::UnableToGetFileMetadata(complete_download.clone(), e))?;
            let file_last_modified = metadata.modified()?;
            let last_updated = head
                .as_ref()
                .ok()
                .and_then(|response| response.headers().get(LAST_MODIFIED))
                .and_then(|last_updated| last_updated.to_str().ok())
                .and_then(|s| parse_http_date(s).ok());
            match last_updated {
                Some(last_updated) if last_updated > file_last_modified => {
                    tracing::debug!("{} is stale, downloading again", complete_download.display());
                }
                // Unchanged upstream, or offline
                _ => return Ok(complete_download),
            }
        }

        let incomplete_download = partial_path(&complete_download);
        tracing::trace!("Downloading into {:?}", incomplete_download);
        download_into(url, &incomplete_download, head?, client, token, progress).await?;
        tokio::fs::rename(&incomplete_download, &complete_download).await?;

        Ok(complete_download)
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            location: dirs::data_dir().map(|dir| dir.join("backdrop").join("cache")),
            huggingface_token: None,
        }
    }
}

fn partial_path(complete: &Path) -> PathBuf {
    let mut name = complete.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

async fn download_into<U: IntoUrl>(
    url: U,
    file: &Path,
    head: Response,
    client: reqwest::Client,
    token: Option<String>,
    mut progress: impl FnMut(FileLoadingProgress),
) -> Result<(), CacheError> {
    let start_time = std::time::Instant::now();
    let length = head
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|length| length.to_str().ok())
        .and_then(|s| u64::from_str(s).ok());

    let (start, mut output_file) = if let Ok(metadata) = tokio::fs::metadata(file).await {
        let output_file = OpenOptions::new().append(true).open(file).await?;
        (metadata.len(), output_file)
    } else {
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        (0, File::create(file).await?)
    };

    let report = |progress_bytes: u64, size: u64| FileLoadingProgress {
        progress: progress_bytes,
        cached_size: start,
        size,
        start_time,
    };

    if let Some(length) = length {
        progress(report(start, length));
        if start == length {
            tracing::trace!("File {} already downloaded", file.display());
            return Ok(());
        }
    }

    let mut request = client.get(url).with_authorization_header(token);
    if let Some(range) = length
        .and_then(|length| HeaderValue::from_str(&format!("bytes={}-{}", start, length - 1)).ok())
    {
        tracing::trace!("Fetching range {:?}", range);
        request = request.header(RANGE, range);
    }
    let mut response = request.send().await?;

    let status = response.status();
    if !(status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT) {
        return Err(CacheError::UnexpectedStatusCode(status));
    }
    if status == StatusCode::OK && start > 0 {
        // The server ignored the range, start over
        output_file = File::create(file).await?;
    }

    let mut current_progress = if status == StatusCode::OK { 0 } else { start };
    while let Some(chunk) = response.chunk().await? {
        output_file.write_all(&chunk).await?;
        current_progress += chunk.len() as u64;
        if let Some(length) = length {
            progress(report(current_progress, length));
        }
    }
    output_file.flush().await?;

    tracing::trace!("Download of {} complete", file.display());

    Ok(())
}

trait RequestBuilderExt {
    fn with_authorization_header(self, token: Option<String>) -> Self;
}

impl RequestBuilderExt for reqwest::RequestBuilder {
    fn with_authorization_header(self, token: Option<String>) -> Self {
        if let Some(token) = token {
            self.header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"))
        } else {
            self
        }
    }
}

fn huggingface_token() -> Option<String> {
    let cache = hf_hub::Cache::default();
    cache.token().or_else(|| std::env::var("HF_TOKEN").ok())
}
