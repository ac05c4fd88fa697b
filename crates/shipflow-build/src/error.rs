use shipflow_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Binary {0} not found in PATH")]
    ToolNotFound(String),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Push failed for {tag}: {message}")]
    PushFailed { tag: String, message: String },

    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Missing tags to save")]
    MissingTags,

    #[error("Invalid image archive {path}: {message}")]
    InvalidArchive { path: PathBuf, message: String },

    #[error("Not logged in on a registry")]
    NotLoggedIn,

    #[error("Invalid tag {tag}: must use registry {registry}")]
    RegistryMismatch { tag: String, registry: String },

    #[error("Cannot {operation} using {tool}")]
    Unsupported {
        tool: &'static str,
        operation: &'static str,
    },

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// コマンド失敗をビルド失敗に変換
    pub(crate) fn into_build_failure(self) -> Self {
        match self {
            BuildError::CommandFailed { command, message } => {
                BuildError::BuildFailed(format!("{}: {}", command, message))
            }
            other => other,
        }
    }

    /// コマンド失敗をプッシュ失敗に変換
    pub(crate) fn into_push_failure(self, tag: &str) -> Self {
        match self {
            BuildError::CommandFailed { message, .. } => BuildError::PushFailed {
                tag: tag.to_string(),
                message,
            },
            other => other,
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::ToolNotFound(binary) => {
                format!(
                    "{} が見つかりません\n\
                     \n\
                     解決方法:\n\
                     1. {} をインストールしてください\n\
                     2. --build-tool / --push-tool で別のツールを指定してください",
                    binary, binary
                )
            }
            BuildError::NotLoggedIn => "レジストリにログインしていません。\n\
                 \n\
                 設定ファイルまたはシークレットに docker の認証情報を追加してください。"
                .to_string(),
            BuildError::RegistryMismatch { tag, registry } => {
                format!(
                    "タグ {} はレジストリ {} を使用していません。\n\
                     \n\
                     --registry の指定とアーカイブのタグを確認してください。",
                    tag, registry
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    msg
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
pub type BuildResult<T> = Result<T>;
