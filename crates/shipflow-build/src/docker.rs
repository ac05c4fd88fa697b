//! docker CLI バックエンド

use crate::backend::{ArchivePusher, BuildBackend};
use crate::cli::{CliEngine, LISTING_FORMAT, parse_listing};
use crate::error::{BuildError, Result};
use crate::tool::Tool;
use async_trait::async_trait;
use shipflow_core::{BuildTag, LocalImage};
use std::path::Path;

pub struct Docker {
    cli: CliEngine,
}

impl Docker {
    pub fn new() -> Result<Self> {
        Ok(Self::with_tool(Tool::locate("docker")?))
    }

    pub fn with_tool(tool: Tool) -> Self {
        Self {
            cli: CliEngine::new(tool),
        }
    }
}

#[async_trait]
impl ArchivePusher for Docker {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn login(&mut self, registry: &str, username: &str, password: &str) -> Result<()> {
        self.cli.login(registry, username, password).await
    }

    async fn push_archive(&self, path: &Path, custom_tag: Option<&str>) -> Result<Vec<String>> {
        self.cli.push_archive(path, custom_tag).await
    }
}

#[async_trait]
impl BuildBackend for Docker {
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

    /// docker はすべてのタグを一度に保存できる
    async fn save(&self, tags: &[BuildTag], output: &Path) -> Result<()> {
        if tags.is_empty() {
            return Err(BuildError::MissingTags);
        }
        let tags: Vec<&BuildTag> = tags.iter().collect();
        self.cli.save(&tags, output, &[]).await
    }

    async fn push(&self, tag: &str) -> Result<()> {
        self.cli.push(tag).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tool::fake_tool;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_images() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(
            dir.path(),
            "docker",
            "echo 'registry.com/repo/test latest sha256:aaaa'\necho 'nginx alpine <none>'\necho 'project/base latest sha256:bbbb'",
        );
        let docker = Docker::with_tool(tool);

        let images = docker.list_images().await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].pinned_reference(), "registry.com/repo/test@sha256:aaaa");
        assert_eq!(images[1].pinned_reference(), "project/base@sha256:bbbb");
    }

    #[tokio::test]
    async fn test_save_all_tags_at_once() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let tool = fake_tool(dir.path(), "docker", &format!("echo \"$@\" > {}", log.display()));
        let docker = Docker::with_tool(tool);

        let tags = vec![BuildTag::new("repo/app:a"), BuildTag::new("repo/app:b")];
        docker.save(&tags, Path::new("/out/app.tar")).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(log).unwrap().trim(),
            "save --output /out/app.tar repo/app:a repo/app:b"
        );
    }

    #[tokio::test]
    async fn test_save_without_tags() {
        let dir = TempDir::new().unwrap();
        let docker = Docker::with_tool(fake_tool(dir.path(), "docker", "exit 0"));

        let err = docker.save(&[], Path::new("/out/app.tar")).await.unwrap_err();
        assert!(matches!(err, BuildError::MissingTags));
    }

    #[tokio::test]
    async fn test_failed_build_and_push() {
        let dir = TempDir::new().unwrap();
        let docker = Docker::with_tool(fake_tool(dir.path(), "docker", "exit 1"));

        let err = docker
            .build(Path::new("."), Path::new("Dockerfile"), &[BuildTag::new("a:b")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::BuildFailed(_)));

        let err = docker.push("registry.com/a:b").await.unwrap_err();
        assert!(matches!(err, BuildError::PushFailed { ref tag, .. } if tag == "registry.com/a:b"));
    }
}
