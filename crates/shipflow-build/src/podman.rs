//! podman CLI バックエンド
//!
//! docker 互換のコマンド体系を使いますが、保存は先頭タグのみで行い、
//! 残りのタグはアーカイブのマニフェストを書き換えて付与します。

use crate::backend::{ArchivePusher, BuildBackend, patch_saved_tags};
use crate::cli::{CliEngine, LISTING_FORMAT, parse_listing};
use crate::error::{BuildError, Result};
use crate::tool::Tool;
use async_trait::async_trait;
use shipflow_core::{BuildTag, LocalImage};
use std::path::Path;

pub struct Podman {
    cli: CliEngine,
}

impl Podman {
    pub fn new() -> Result<Self> {
        Ok(Self::with_tool(Tool::locate("podman")?))
    }

    pub fn with_tool(tool: Tool) -> Self {
        Self {
            cli: CliEngine::new(tool),
        }
    }
}

#[async_trait]
impl ArchivePusher for Podman {
    fn name(&self) -> &'static str {
        "podman"
    }

    async fn login(&mut self, registry: &str, username: &str, password: &str) -> Result<()> {
        self.cli.login(registry, username, password).await
    }

    async fn push_archive(&self, path: &Path, custom_tag: Option<&str>) -> Result<Vec<String>> {
        self.cli.push_archive(path, custom_tag).await
    }
}

#[async_trait]
impl BuildBackend for Podman {
    async fn list_images(&self) -> Result<Vec<LocalImage>> {
        let stdout = self
            .cli
            .output(
                "images",
                &["--no-trunc", "--filter", "dangling=false", "--format", LISTING_FORMAT],
            )
            .await?;
        Ok(parse_listing(&stdout))
    }

    async fn build(
        &self,
        context_dir: &Path,
        dockerfile: &Path,
        tags: &[BuildTag],
        build_args: &[String],
    ) -> Result<()> {
        self.cli
            .build(context_dir, dockerfile, tags, build_args, &[])
            .await
    }

    async fn save(&self, tags: &[BuildTag], output: &Path) -> Result<()> {
        let Some(main_tag) = tags.first() else {
            return Err(BuildError::MissingTags);
        };

        self.cli
            .save(&[main_tag], output, &["--format", "docker-archive"])
            .await?;
        patch_saved_tags(output, tags)
    }

    async fn push(&self, tag: &str) -> Result<()> {
        self.cli.push(tag).await
    }
}
