use crate::target::Target;
use crate::utils::{ConfigSource, check_output_archive};
use colored::Colorize;
use shipflow_build::{BackendKind, create_backend};
use shipflow_core::generate_tags;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct BuildOptions {
    pub dockerfile: String,
    pub write: Option<PathBuf>,
    pub push: bool,
    pub image: Option<String>,
    pub registry: String,
    pub tags: Vec<String>,
    pub build_args: Vec<String>,
    pub build_tool: BackendKind,
    pub cache: Option<PathBuf>,
}

/// Dockerfile をビルドし、保存・プッシュする
pub async fn handle(
    target: &Target,
    source: &ConfigSource,
    options: BuildOptions,
) -> anyhow::Result<()> {
    let dockerfile = target.check_path(&options.dockerfile)?;
    let output = options
        .write
        .as_deref()
        .map(check_output_archive)
        .transpose()?;

    let base_image = options
        .image
        .clone()
        .unwrap_or_else(|| format!("shipflow-{}", uuid::Uuid::new_v4()));
    let tags = generate_tags(&base_image, &options.tags, Some(&options.registry));
    for tag in &tags {
        info!("Will produce image {}", tag);
    }

    let mut backend = create_backend(options.build_tool, options.cache.as_deref()).await?;

    if options.push {
        let auth = source.load().await?.docker_auth()?;
        if auth.registry != options.registry {
            warn!(
                "The credentials are the ones for {:?} not {:?}",
                auth.registry, options.registry
            );
        }
        backend
            .login(&auth.registry, &auth.username, &auth.password)
            .await?;
    }

    backend
        .build(target.dir(), &dockerfile, &tags, &options.build_args)
        .await?;
    println!("{}", "✓ ビルドが完了しました".green());

    if let Some(output) = &output {
        backend.save(&tags, output).await?;
        println!("  保存先: {}", output.display().to_string().cyan());
    }

    if options.push {
        for tag in &tags {
            backend.push(tag.as_str()).await?;
            println!("  {} {}", "→".green(), tag.as_str().cyan());
        }
    }

    Ok(())
}
