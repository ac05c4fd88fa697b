//! Docker in Docker バックエンド
//!
//! CI のタスク内で提供される Docker デーモンに API で接続します。
//! ログインとプッシュには対応していません。

use crate::backend::{ArchivePusher, BuildBackend, patch_saved_tags};
use crate::context::create_context;
use crate::error::{BuildError, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::image::{BuildImageOptions, TagImageOptions};
use bollard::models::{BuildInfo, ImageSummary};
use bollard::query_parameters::ListImagesOptions;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{Either, Full};
use shipflow_core::{BuildTag, ImageRef, LocalImage, split_image_tag};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

pub struct DinD {
    docker: Docker,
}

impl DinD {
    /// デーモンに接続してバージョンを確認
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_defaults()?;
        docker.ping().await?;

        let version = docker.version().await?;
        info!(
            api_version = version.api_version.as_deref().unwrap_or("unknown"),
            "Connected to Docker daemon"
        );

        Ok(Self { docker })
    }

    fn unsupported(operation: &'static str) -> BuildError {
        BuildError::Unsupported {
            tool: "dind",
            operation,
        }
    }
}

#[async_trait]
impl ArchivePusher for DinD {
    fn name(&self) -> &'static str {
        "dind"
    }

    async fn login(&mut self, _registry: &str, _username: &str, _password: &str) -> Result<()> {
        Err(Self::unsupported("login"))
    }

    async fn push_archive(&self, _path: &Path, _custom_tag: Option<&str>) -> Result<Vec<String>> {
        Err(Self::unsupported("push"))
    }
}

#[async_trait]
impl BuildBackend for DinD {
    async fn list_images(&self) -> Result<Vec<LocalImage>> {
        let options = ListImagesOptions {
            all: true,
            ..Default::default()
        };
        let summaries = self.docker.list_images(Some(options)).await?;
        Ok(images_from_summaries(&summaries))
    }

    async fn build(
        &self,
        context_dir: &Path,
        dockerfile: &Path,
        tags: &[BuildTag],
        build_args: &[String],
    ) -> Result<()> {
        let Some(main_tag) = tags.first() else {
            return Err(BuildError::MissingTags);
        };
        info!("Building docker image with DinD {}", dockerfile.display());

        let context = create_context(context_dir, dockerfile)?;
        let build_args = parse_build_args(build_args);
        let buildargs: HashMap<&str, &str> = build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let options = BuildImageOptions {
            dockerfile: context.dockerfile.as_str(),
            t: main_tag.as_str(),
            buildargs,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let body = Full::new(Bytes::from(context.data));
        let mut stream = self.docker.build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => handle_build_output(output)?,
                Err(e) => return Err(BuildError::BuildFailed(e.to_string())),
            }
        }

        // 残りのタグはビルド済みイメージに付与する
        for tag in &tags[1..] {
            let (repo, tag_name) = split_image_tag(tag.as_str());
            let options = TagImageOptions {
                repo: repo.as_str(),
                tag: tag_name.as_str(),
            };
            self.docker.tag_image(main_tag.as_str(), Some(options)).await?;
        }

        let names: Vec<&str> = tags.iter().map(BuildTag::as_str).collect();
        info!("Built image {}", names.join(", "));
        Ok(())
    }

    /// 先頭タグをエクスポートしてから残りのタグを書き込む
    async fn save(&self, tags: &[BuildTag], output: &Path) -> Result<()> {
        let Some(main_tag) = tags.first() else {
            return Err(BuildError::MissingTags);
        };
        info!("Saving image {} to {}", main_tag, output.display());

        let mut file = tokio::fs::File::create(output).await?;
        let mut stream = self.docker.export_image(main_tag.as_str());
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        patch_saved_tags(output, tags)
    }

    async fn push(&self, _tag: &str) -> Result<()> {
        Err(Self::unsupported("push"))
    }
}

/// デーモンのイメージ一覧を LocalImage に変換
///
/// タグごとに1エントリ。ダイジェストにはイメージIDを使用する。
pub(crate) fn images_from_summaries(summaries: &[ImageSummary]) -> Vec<LocalImage> {
    let mut images = Vec::new();

    for summary in summaries {
        for repo_tag in &summary.repo_tags {
            if repo_tag == "<none>:<none>" {
                continue;
            }
            match ImageRef::parse(repo_tag) {
                Ok(image) => images.push(LocalImage::new(None, image.repository, image.tag, &summary.id)),
                Err(_) => warn!("Did not parse this image: {}", repo_tag),
            }
        }
    }

    images
}

/// `KEY=VALUE` 形式のビルド引数をマップに変換
fn parse_build_args(build_args: &[String]) -> HashMap<String, String> {
    build_args
        .iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (arg.clone(), std::env::var(arg).unwrap_or_default()),
        })
        .collect()
}

fn handle_build_output(output: BuildInfo) -> Result<()> {
    if let Some(stream) = output.stream {
        let line = stream.trim_end();
        if !line.is_empty() {
            info!("DinD build: {}", line);
        }
    }

    if let Some(err) = output.error {
        error!("DinD build: {}", err);
        return Err(BuildError::BuildFailed(err));
    }

    if let Some(detail) = output.error_detail {
        let message = match (detail.message, detail.code) {
            (Some(message), _) => message,
            (None, Some(code)) => format!("Unknown build error (code {})", code),
            (None, None) => "Unknown build error".to_string(),
        };
        error!("DinD build: {}", message);
        return Err(BuildError::BuildFailed(message));
    }

    if let Some(status) = output.status {
        match output.id {
            Some(id) => info!("DinD build: [{}] {}", id, status),
            None => info!("DinD build: {}", status),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::ErrorDetail;

    #[test]
    fn test_images_from_summaries() {
        let summaries = vec![
            ImageSummary {
                id: "sha256:1111".to_string(),
                repo_tags: vec!["project/base:latest".to_string(), "project/base:v1".to_string()],
                ..Default::default()
            },
            ImageSummary {
                id: "sha256:2222".to_string(),
                repo_tags: vec!["<none>:<none>".to_string()],
                ..Default::default()
            },
        ];

        let images = images_from_summaries(&summaries);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].repository, "project/base");
        assert_eq!(images[0].tag, "latest");
        assert_eq!(images[0].digest, "1111");
        assert_eq!(images[1].tag, "v1");
        assert_eq!(images[1].pinned_reference(), "project/base@sha256:1111");
    }

    #[test]
    fn test_parse_build_args() {
        let args = parse_build_args(&["A=1".to_string(), "B=x=y".to_string()]);
        assert_eq!(args.get("A").map(String::as_str), Some("1"));
        assert_eq!(args.get("B").map(String::as_str), Some("x=y"));
    }

    #[test]
    fn test_build_error_detail_output() {
        let output = BuildInfo {
            error_detail: Some(ErrorDetail {
                code: Some(1),
                message: Some("pull access denied".to_string()),
            }),
            ..Default::default()
        };
        assert!(matches!(
            handle_build_output(output),
            Err(BuildError::BuildFailed(msg)) if msg == "pull access denied"
        ));

        let output = BuildInfo {
            error_detail: Some(ErrorDetail {
                code: Some(2),
                message: None,
            }),
            ..Default::default()
        };
        assert!(matches!(
            handle_build_output(output),
            Err(BuildError::BuildFailed(msg)) if msg == "Unknown build error (code 2)"
        ));
    }

    #[test]
    fn test_build_error_output() {
        let output = BuildInfo {
            error: Some("failed to fetch".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            handle_build_output(output),
            Err(BuildError::BuildFailed(msg)) if msg == "failed to fetch"
        ));
    }
}
