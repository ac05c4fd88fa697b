//! img バックエンド
//!
//! デーモンを使わずにビルドする img ツールのラッパー。
//! 状態はステートディレクトリに保持し、すべてのサブコマンドに `--state` で渡します。

use crate::backend::{ArchivePusher, BuildBackend, patch_saved_tags};
use crate::cli::CliEngine;
use crate::error::{BuildError, Result};
use crate::tool::Tool;
use async_trait::async_trait;
use regex::Regex;
use shipflow_core::{BuildTag, LocalImage};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::TempDir;
use tracing::{info, warn};

/// `img ls` の1行
///
/// `docker.io/mozilla/taskboot:latest  172.3MiB  25 hours ago  About an hour ago  sha256:e339...`
static IMG_LS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([\w.]+)/(([\w\-.]+)/([\w\-.]+)):([\w\-.]+)\t+([.\w]+)\t+([\w ]+)\t+([\w ]+)\t+sha256:(\w{64})",
    )
    .unwrap()
});

/// ステートディレクトリ
enum ImgState {
    /// キャッシュ配下に永続化
    Cache(PathBuf),
    /// バックエンドの破棄時に削除
    Temporary(TempDir),
}

pub struct Img {
    cli: CliEngine,
    state: ImgState,
}

impl Img {
    pub fn new(cache: Option<&Path>) -> Result<Self> {
        Self::with_tool(Tool::locate("img")?, cache)
    }

    pub fn with_tool(tool: Tool, cache: Option<&Path>) -> Result<Self> {
        let state = match cache {
            Some(cache) => {
                let dir = cache.join("img");
                std::fs::create_dir_all(&dir)?;
                ImgState::Cache(dir.canonicalize()?)
            }
            None => ImgState::Temporary(tempfile::Builder::new().suffix("-img").tempdir()?),
        };

        let state_dir = match &state {
            ImgState::Cache(dir) => dir.clone(),
            ImgState::Temporary(dir) => dir.path().to_path_buf(),
        };
        info!("Docker state is using {}", state_dir.display());

        let cli = CliEngine::new(tool)
            .with_state_args(vec!["--state".to_string(), state_dir.display().to_string()]);
        Ok(Self { cli, state })
    }

    pub fn state_dir(&self) -> &Path {
        match &self.state {
            ImgState::Cache(dir) => dir,
            ImgState::Temporary(dir) => dir.path(),
        }
    }
}

#[async_trait]
impl ArchivePusher for Img {
    fn name(&self) -> &'static str {
        "img"
    }

    async fn login(&mut self, registry: &str, username: &str, password: &str) -> Result<()> {
        self.cli.login(registry, username, password).await
    }

    async fn push_archive(&self, path: &Path, custom_tag: Option<&str>) -> Result<Vec<String>> {
        self.cli.push_archive(path, custom_tag).await
    }
}

#[async_trait]
impl BuildBackend for Img {
    async fn list_images(&self) -> Result<Vec<LocalImage>> {
        let stdout = self.cli.output("ls", &[]).await?;
        Ok(parse_img_listing(&stdout))
    }

    async fn build(
        &self,
        context_dir: &Path,
        dockerfile: &Path,
        tags: &[BuildTag],
        build_args: &[String],
    ) -> Result<()> {
        self.cli
            .build(context_dir, dockerfile, tags, build_args, &["--no-console"])
            .await
    }

    /// img は複数タグでの保存に対応していないため、先頭タグで保存してから書き換える
    async fn save(&self, tags: &[BuildTag], output: &Path) -> Result<()> {
        let Some(main_tag) = tags.first() else {
            return Err(BuildError::MissingTags);
        };

        self.cli.save(&[main_tag], output, &[]).await?;
        patch_saved_tags(output, tags)
    }

    async fn push(&self, tag: &str) -> Result<()> {
        self.cli.push(tag).await
    }
}

/// `img ls` の出力をパース（先頭行はヘッダー）
pub(crate) fn parse_img_listing(stdout: &str) -> Vec<LocalImage> {
    stdout
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match IMG_LS_REGEX.captures(line) {
            Some(caps) => Some(LocalImage::new(
                Some(caps[1].to_string()),
                &caps[2],
                &caps[5],
                &caps[9],
            )),
            None => {
                warn!("Did not parse this image: {}", line);
                None
            }
        })
        .collect()
}
