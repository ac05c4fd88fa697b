//! docker-compose ファイルからのビルド
//!
//! `build` 宣言を持つサービスごとに、FROM のローカライズ、ビルド（リトライ付き）、
//! アーカイブへの保存を順に行います。

use crate::backend::BuildBackend;
use crate::error::Result;
use shipflow_core::{BuildTag, ComposeFile, RetryPolicy, generate_tags, localize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// ビルドのリトライ間隔
const BUILD_RETRY_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// タグに付与するレジストリ
    pub registry: Option<String>,
    /// アーカイブの出力ディレクトリ
    pub write: Option<PathBuf>,
    /// サービスごとのビルド試行回数
    pub build_retries: u32,
    /// すべてのサービスに渡すビルド引数
    pub build_args: Vec<String>,
    /// ビルド対象のサービス（空なら全サービス）
    pub services: Vec<String>,
    pub tags: Vec<String>,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            registry: None,
            write: None,
            build_retries: 3,
            build_args: Vec::new(),
            services: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// ビルド済みサービス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltService {
    pub name: String,
    pub tags: Vec<BuildTag>,
    pub archive: Option<PathBuf>,
}

pub struct ComposeBuilder<'a> {
    backend: &'a dyn BuildBackend,
    options: ComposeOptions,
    retry_wait: Duration,
}

impl<'a> ComposeBuilder<'a> {
    pub fn new(backend: &'a dyn BuildBackend, options: ComposeOptions) -> Self {
        Self {
            backend,
            options,
            retry_wait: BUILD_RETRY_WAIT,
        }
    }

    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    /// compose ファイルのサービスを順にビルド
    #[tracing::instrument(skip(self), fields(tool = self.backend.name()))]
    pub async fn build(&self, compose_path: &Path) -> Result<Vec<BuiltService>> {
        let compose = ComposeFile::load(compose_path)?;

        if let Some(output) = &self.options.write {
            std::fs::create_dir_all(output)?;
            info!("Will write images in {}", output.display());
        }

        // パスは compose ファイルのディレクトリからの相対
        let root = compose_path.parent().unwrap_or(Path::new("."));
        let retry = RetryPolicy::new(self.options.build_retries, self.retry_wait);
        let mut built = Vec::new();

        for (name, service) in &compose.services {
            let Some(spec) = service.build_spec() else {
                info!("Skipping service {}, no build declaration", name);
                continue;
            };

            if !self.options.services.is_empty() && !self.options.services.contains(name) {
                info!(
                    "Skipping service {}, building only {}",
                    name,
                    self.options.services.join(", ")
                );
                continue;
            }

            info!("Building image for service {}", name);
            let context = root.join(&spec.context);
            let dockerfile = context.join(&spec.dockerfile);

            // リモートより先にローカルのイメージを使うよう FROM を書き換える
            let images = self.backend.list_images().await?;
            localize(&dockerfile, &images)?;

            let image = service.image.as_deref().unwrap_or(name);
            let tags = generate_tags(image, &self.options.tags, self.options.registry.as_deref());
            let mut build_args = spec.args.clone();
            build_args.extend(self.options.build_args.iter().cloned());

            retry
                .run(|| self.backend.build(&context, &dockerfile, &tags, &build_args))
                .await?;

            let archive = match &self.options.write {
                Some(output) => {
                    let path = output.join(format!("{}.tar", name));
                    self.backend.save(&tags, &path).await?;
                    Some(path)
                }
                None => None,
            };

            built.push(BuiltService {
                name: name.clone(),
                tags,
                archive,
            });
        }

        info!("Compose file fully processed.");
        Ok(built)
    }
}
