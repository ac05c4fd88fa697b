//! `name:path/to/artifact` 形式の名前付きアーティファクト

use crate::error::{ArtifactError, Result};
use crate::queue::TaskArtifact;
use crate::resolver::ArtifactResolver;
use crate::transfer::ArtifactTransfer;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArtifact {
    pub name: String,
    /// 依存タスクのアーティファクトに対する fnmatch フィルタ
    pub filter: String,
}

impl NamedArtifact {
    /// コロンはちょうど1つ、両側とも空でないこと
    pub fn parse(argument: &str) -> Result<Self> {
        let invalid = || ArtifactError::InvalidArgument(argument.to_string());

        if argument.matches(':').count() != 1 {
            return Err(invalid());
        }
        let (name, filter) = argument.split_once(':').ok_or_else(invalid)?;
        if name.is_empty() || filter.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            name: name.to_string(),
            filter: filter.to_string(),
        })
    }

    /// パスの語幹を名前にする（`public/web.tar` → `web:public/web.tar`）
    pub fn from_path(path: &str) -> Self {
        let name = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        Self {
            name,
            filter: path.to_string(),
        }
    }
}

impl FromStr for NamedArtifact {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// ダウンロード済みの名前付きアーティファクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub name: String,
    pub artifact: TaskArtifact,
    pub path: PathBuf,
}

/// 名前付きアーティファクトをそれぞれ1つに解決してダウンロード
///
/// 引数は先にすべて検証し、その後順にダウンロードする。
pub async fn load_named_artifacts(
    resolver: &ArtifactResolver<'_>,
    transfer: &ArtifactTransfer<'_>,
    root_task_id: &str,
    named: &[NamedArtifact],
) -> Result<Vec<DownloadedArtifact>> {
    if named.is_empty() {
        info!("No artifact arguments to process");
        return Ok(Vec::new());
    }

    let mut downloaded = Vec::with_capacity(named.len());
    for item in named {
        info!("Searching artifact {} with filter {}", item.name, item.filter);

        let artifact = resolver
            .resolve_exactly_one(root_task_id, &item.filter)
            .await?;
        let path = transfer.download_artifact(&artifact).await?;

        downloaded.push(DownloadedArtifact {
            name: item.name.clone(),
            artifact,
            path,
        });
    }

    Ok(downloaded)
}

/// 引数をまとめて解析
pub fn parse_named_arguments(arguments: &[String]) -> Result<Vec<NamedArtifact>> {
    arguments.iter().map(|a| NamedArtifact::parse(a)).collect()
}
