use crate::target::Target;
use colored::Colorize;
use shipflow_build::{BackendKind, ComposeBuilder, ComposeOptions, create_backend};
use std::path::PathBuf;

pub struct ComposeArgs {
    pub compose_file: String,
    pub build_tool: BackendKind,
    pub cache: Option<PathBuf>,
    pub options: ComposeOptions,
}

/// compose ファイルの各サービスをビルド
pub async fn handle(target: &Target, args: ComposeArgs) -> anyhow::Result<()> {
    let compose_path = target.check_path(&args.compose_file)?;
    let backend = create_backend(args.build_tool, args.cache.as_deref()).await?;

    let built = ComposeBuilder::new(backend.as_ref(), args.options)
        .build(&compose_path)
        .await?;

    println!();
    println!(
        "{}",
        format!("✓ {} 個のサービスをビルドしました", built.len())
            .green()
            .bold()
    );
    for service in &built {
        println!("  {}", service.name.cyan());
        for tag in &service.tags {
            println!("    {}", tag);
        }
        if let Some(archive) = &service.archive {
            println!("    保存先: {}", archive.display());
        }
    }

    Ok(())
}
