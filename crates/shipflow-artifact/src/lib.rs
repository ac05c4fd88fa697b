//! shipflow のアーティファクト処理
//!
//! Taskcluster の依存タスクが公開したイメージアーカイブを解決・ダウンロードし、
//! レジストリへのプッシュや Heroku へのリリースを行います。
//! Taskcluster のフック定義の反映もここで扱います。

pub mod error;
pub mod heroku;
pub mod hooks;
pub mod named;
pub mod push;
pub mod queue;
pub mod resolver;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_server;

pub use error::{ArtifactError, Result};
pub use heroku::{FormationUpdate, HEROKU_REGISTRY, HerokuClient, HerokuRelease};
pub use hooks::{HookOutcome, HooksClient, definition_matches};
pub use named::{DownloadedArtifact, NamedArtifact, load_named_artifacts, parse_named_arguments};
pub use push::{PushFilter, push_artifacts};
pub use queue::{ArtifactPage, TaskArtifact, TaskQueue, TaskclusterClient};
pub use resolver::{ArtifactFilter, ArtifactResolver};
pub use transfer::{ArtifactTransfer, decompress};
