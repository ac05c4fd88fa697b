//! ビルドバックエンドの抽象化
//!
//! イメージのビルド・保存・プッシュを行うツールを共通のトレイトで扱います。
//! - [`ArchivePusher`]: 保存済みアーカイブをレジストリへ送るだけのツール（skopeo など）
//! - [`BuildBackend`]: ビルドから保存・プッシュまで行うツール（docker, podman, dind, img）

use crate::dind::DinD;
use crate::docker::Docker;
use crate::error::{BuildError, Result};
use crate::img::Img;
use crate::podman::Podman;
use crate::skopeo::Skopeo;
use async_trait::async_trait;
use shipflow_core::{BuildTag, LocalImage, ManifestStore, is_tar_archive};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// アーカイブをレジストリへプッシュするツール
#[async_trait]
pub trait ArchivePusher: Send + Sync {
    /// ツール名
    fn name(&self) -> &'static str;

    /// レジストリにログイン
    async fn login(&mut self, registry: &str, username: &str, password: &str) -> Result<()>;

    /// 保存済みアーカイブをプッシュし、プッシュしたタグを返す
    ///
    /// `custom_tag` 指定時はアーカイブのタグの代わりにそのタグのみを使用する。
    async fn push_archive(&self, path: &Path, custom_tag: Option<&str>) -> Result<Vec<String>>;
}

/// イメージをビルドするツール
#[async_trait]
pub trait BuildBackend: ArchivePusher {
    /// ローカル状態にあるイメージ一覧
    async fn list_images(&self) -> Result<Vec<LocalImage>>;

    /// すべてのタグとビルド引数を適用してビルド
    async fn build(
        &self,
        context_dir: &Path,
        dockerfile: &Path,
        tags: &[BuildTag],
        build_args: &[String],
    ) -> Result<()>;

    /// イメージをアーカイブとして保存
    async fn save(&self, tags: &[BuildTag], output: &Path) -> Result<()>;

    /// タグをレジストリにプッシュ
    async fn push(&self, tag: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Docker,
    Podman,
    Dind,
    Img,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Docker => "docker",
            BackendKind::Podman => "podman",
            BackendKind::Dind => "dind",
            BackendKind::Img => "img",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "docker" => Ok(BackendKind::Docker),
            "podman" => Ok(BackendKind::Podman),
            "dind" => Ok(BackendKind::Dind),
            "img" => Ok(BackendKind::Img),
            other => Err(format!("Unsupported build tool: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushToolKind {
    Skopeo,
    Docker,
    Podman,
}

impl PushToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushToolKind::Skopeo => "skopeo",
            PushToolKind::Docker => "docker",
            PushToolKind::Podman => "podman",
        }
    }
}

impl fmt::Display for PushToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushToolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "skopeo" => Ok(PushToolKind::Skopeo),
            "docker" => Ok(PushToolKind::Docker),
            "podman" => Ok(PushToolKind::Podman),
            other => Err(format!("Unsupported push tool: {}", other)),
        }
    }
}

/// ビルドバックエンドを作成
///
/// `cache` は img のステートディレクトリの置き場所として使用する。
pub async fn create_backend(kind: BackendKind, cache: Option<&Path>) -> Result<Box<dyn BuildBackend>> {
    tracing::info!("Using build tool {}", kind);
    let backend: Box<dyn BuildBackend> = match kind {
        BackendKind::Docker => Box::new(Docker::new()?),
        BackendKind::Podman => Box::new(Podman::new()?),
        BackendKind::Dind => Box::new(DinD::connect().await?),
        BackendKind::Img => Box::new(Img::new(cache)?),
    };
    Ok(backend)
}

/// プッシュツールを作成
pub fn create_pusher(kind: PushToolKind) -> Result<Box<dyn ArchivePusher>> {
    tracing::info!("Using push tool {}", kind);
    let pusher: Box<dyn ArchivePusher> = match kind {
        PushToolKind::Skopeo => Box::new(Skopeo::new()?),
        PushToolKind::Docker => Box::new(Docker::new()?),
        PushToolKind::Podman => Box::new(Podman::new()?),
    };
    Ok(pusher)
}

/// アーカイブが存在し TAR として読めることを確認
pub(crate) fn check_archive(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(BuildError::InvalidArchive {
            path: path.to_path_buf(),
            message: "missing archive".to_string(),
        });
    }
    if !is_tar_archive(path) {
        return Err(BuildError::InvalidArchive {
            path: path.to_path_buf(),
            message: "not a TAR archive".to_string(),
        });
    }
    Ok(())
}

/// アーカイブのマニフェストからタグを読む
pub(crate) fn archive_tags(path: &Path) -> Result<Vec<String>> {
    Ok(ManifestStore::open(path)?.tags()?)
}

/// すべてのタグがログイン先のレジストリを使っているか確認
pub(crate) fn ensure_registry(registry: &str, tags: &[String]) -> Result<()> {
    match tags.iter().find(|tag| !tag.starts_with(registry)) {
        Some(tag) => Err(BuildError::RegistryMismatch {
            tag: tag.clone(),
            registry: registry.to_string(),
        }),
        None => Ok(()),
    }
}

/// 先頭タグのみで保存したアーカイブに残りのタグを書き込む
pub(crate) fn patch_saved_tags(output: &Path, tags: &[BuildTag]) -> Result<()> {
    if tags.len() > 1 {
        let all: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        ManifestStore::open(output)?.retag(&all)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs::File;
    use std::path::Path;

    /// `docker save` 形式のアーカイブを作成
    pub(crate) fn write_archive(path: &Path, repo_tags: &[&str]) {
        let manifest = serde_json::json!([{
            "Config": "config.json",
            "Layers": ["layer/layer.tar"],
            "RepoTags": repo_tags,
        }]);
        let members: [(&str, Vec<u8>); 3] = [
            ("config.json", br#"{"os":"linux"}"#.to_vec()),
            ("layer/layer.tar", b"layer".to_vec()),
            ("manifest.json", serde_json::to_vec(&manifest).unwrap()),
        ];

        let mut builder = tar::Builder::new(File::create(path).unwrap());
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, data.as_slice()).unwrap();
        }
        builder.finish().unwrap();
    }

    /// OCI レイアウトのアーカイブを作成（manifest.json なし）
    pub(crate) fn write_oci_archive(path: &Path) {
        let mut builder = tar::Builder::new(File::create(path).unwrap());
        for (name, data) in [
            ("oci-layout", br#"{"imageLayoutVersion":"1.0.0"}"#.as_slice()),
            ("index.json", br#"{"schemaVersion":2,"manifests":[]}"#.as_slice()),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, data).unwrap();
        }
        builder.finish().unwrap();
    }
}
