use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid image name: {0:?}")]
    InvalidImageName(String),

    #[error("Image archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Invalid image archive {path}: {message}")]
    InvalidArchive { path: PathBuf, message: String },

    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Compose file not found: {0}")]
    ComposeFileNotFound(PathBuf),

    #[error("Only docker compose version 3 is supported (found {0})")]
    UnsupportedComposeVersion(String),

    #[error("Invalid compose file: {0}")]
    InvalidCompose(String),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// アーカイブ形式のエラーを生成
    pub(crate) fn archive(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        CoreError::InvalidArchive {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// アーカイブ/マニフェストの形式エラーかどうか
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidArchive { .. } | CoreError::ArchiveNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
