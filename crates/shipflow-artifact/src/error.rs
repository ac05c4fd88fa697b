use shipflow_build::BuildError;
use shipflow_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("No task dependencies for {0}")]
    NoDependencies(String),

    #[error("No artifact found for {filter}")]
    NotFound { filter: String },

    #[error("More than one artifact found for {filter}: {matches:?}")]
    Ambiguous {
        filter: String,
        matches: Vec<String>,
    },

    #[error("Invalid artifact filter {filter:?}: {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("{0:?} doesn't match format 'name:path/to/artifact'")]
    InvalidArgument(String),

    #[error("No content-length for {0}")]
    MissingLength(String),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Transfer error: {0}")]
    Transfer(#[from] reqwest::Error),

    #[error("Invalid hook definition: {0}")]
    InvalidHook(String),

    #[error("Failed to sign request: {0}")]
    Signing(String),

    #[error("Invalid URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtifactError {
    /// リトライしても結果が変わらないエラーか（4xx 応答）
    pub fn is_permanent(&self) -> bool {
        matches!(self, ArtifactError::Http { status, .. } if (400..500).contains(status))
    }

    /// ユーザー向けのヒントを含むメッセージ
    pub fn user_message(&self) -> String {
        match self {
            ArtifactError::NoDependencies(task_id) => format!(
                "タスク {} に依存タスクがありません\n\
                ヒント: アーティファクトを生成するタスクを dependencies に追加してください",
                task_id
            ),
            ArtifactError::Ambiguous { filter, matches } => format!(
                "{} に一致するアーティファクトが複数あります:\n  {}\n\
                ヒント: より具体的なフィルタを指定してください",
                filter,
                matches.join("\n  ")
            ),
            ArtifactError::Build(e) => e.user_message(),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArtifactError>;
