use std::fmt::Display;
use std::path::PathBuf;

/// A source for a file, either from Hugging Face or a local path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    /// A file from Hugging Face
    HuggingFace {
        /// The model id to use
        model_id: String,
        /// The revision to use
        revision: String,
        /// The file to use
        file: String,
    },
    /// A local file
    Local(PathBuf),
}

impl Display for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSource::HuggingFace {
                model_id,
                revision,
                file,
            } => write!(f, "hf://{}/{}/{}", model_id, revision, file),
            FileSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FileSource {
    /// Create a new source for a file from Hugging Face
    pub fn huggingface(
        model_id: impl ToString,
        revision: impl ToString,
        file: impl ToString,
    ) -> Self {
        Self::HuggingFace {
            model_id: model_id.to_string(),
            revision: revision.to_string(),
            file: file.to_string(),
        }
    }

    /// Create a new source for a file on the main branch of a Hugging Face repo
    pub fn huggingface_main(model_id: impl ToString, file: impl ToString) -> Self {
        Self::huggingface(model_id, "main", file)
    }

    /// Create a new source for a local file
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(path.into())
    }

    /// Use a local override if one is given, otherwise fall back to `self`
    pub fn or_local(self, path: Option<impl Into<PathBuf>>) -> Self {
        match path {
            Some(path) => Self::local(path),
            None => self,
        }
    }
}
