mod commands;
mod target;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use shipflow_artifact::{ArtifactError, PushFilter};
use shipflow_build::{BackendKind, BuildError, ComposeOptions, PushToolKind};
use std::path::PathBuf;
use target::Target;
use utils::ConfigSource;

#[derive(Parser)]
#[command(name = "ship")]
#[command(about = "コンテナイメージをビルドして、CI から届ける。", long_about = None)]
struct Cli {
    /// 認証情報の設定ファイル（YAML / JSON / TOML）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Taskcluster シークレットの名前
    #[arg(long, global = true, env = "TASKCLUSTER_SECRET")]
    secret: Option<String>,

    /// 対象ディレクトリ（デフォルトはカレントディレクトリ）
    #[arg(long, global = true)]
    target: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dockerfile からイメージをビルド
    Build {
        /// ビルドする Dockerfile（ターゲットからの相対パス）
        dockerfile: String,
        /// イメージの保存先（.tar）
        #[arg(long)]
        write: Option<PathBuf>,
        /// ビルド後にレジストリへプッシュ
        #[arg(long)]
        push: bool,
        /// タグなしのイメージ名（デフォルトはランダム）
        #[arg(long)]
        image: Option<String>,
        /// タグに付与するレジストリ
        #[arg(long, env = "REGISTRY", default_value = "registry.hub.docker.com")]
        registry: String,
        /// イメージのタグ（複数指定可、デフォルトは latest）
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// ビルド引数（KEY=VALUE、複数指定可）
        #[arg(long = "build-arg")]
        build_args: Vec<String>,
        /// ビルドツール (docker, podman, dind, img)
        #[arg(long, env = "BUILD_TOOL", default_value = "podman")]
        build_tool: BackendKind,
        /// img のキャッシュディレクトリ
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// docker-compose ファイルのサービスをビルド
    BuildCompose {
        /// compose ファイル（ターゲットからの相対パス）
        #[arg(short = 'c', long = "compose-file", default_value = "docker-compose.yml")]
        compose_file: String,
        /// タグに付与するレジストリ
        #[arg(long, env = "REGISTRY", default_value = "registry.hub.docker.com")]
        registry: String,
        /// イメージを保存するディレクトリ
        #[arg(long)]
        write: Option<PathBuf>,
        /// サービスごとのビルド試行回数
        #[arg(short = 'r', long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
        build_retries: u32,
        /// すべてのサービスに渡すビルド引数
        #[arg(long = "build-arg")]
        build_args: Vec<String>,
        /// ビルドするサービス（複数指定可、デフォルトは全サービス）
        #[arg(long = "service")]
        services: Vec<String>,
        /// イメージのタグ（複数指定可、デフォルトは latest）
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// ビルドツール (docker, podman, dind, img)
        #[arg(long, default_value = "img")]
        build_tool: BackendKind,
        /// img のキャッシュディレクトリ
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// 依存タスクのアーティファクトをダウンロード
    RetrieveArtifact {
        /// 依存関係を持つタスクのID
        #[arg(long, env = "TASK_ID")]
        task_id: String,
        /// ダウンロードするアーティファクトのパス
        #[arg(long, num_args = 1.., required = true)]
        artifacts: Vec<String>,
        /// 保存先ディレクトリ
        #[arg(long)]
        output_path: Option<PathBuf>,
    },
    /// 依存タスクが生成したイメージをプッシュ
    PushArtifact {
        /// 依存関係を持つタスクのID
        #[arg(long, env = "TASK_ID")]
        task_id: String,
        /// アーティファクトのフィルタ（fnmatch 形式）
        #[arg(long, default_value = "public/**.tar.zst")]
        artifact_filter: String,
        /// 除外するアーティファクトのフィルタ（fnmatch 形式）
        #[arg(long)]
        exclude_filter: Option<String>,
        /// プッシュツール (skopeo, docker, podman)
        #[arg(long, env = "PUSH_TOOL", default_value = "skopeo")]
        push_tool: PushToolKind,
    },
    /// イメージをプッシュして Heroku にリリース
    DeployHeroku {
        /// 依存関係を持つタスクのID
        #[arg(long, env = "TASK_ID")]
        task_id: String,
        /// Heroku アプリケーション名
        #[arg(long)]
        heroku_app: String,
        /// プッシュツール (skopeo, docker, podman)
        #[arg(long, env = "PUSH_TOOL", default_value = "skopeo")]
        push_tool: PushToolKind,
        /// dyno:path/to/artifact の組（複数指定可）
        #[arg(required = true)]
        artifacts: Vec<String>,
    },
    /// Taskcluster フックを定義ファイルの内容に更新（なければ作成）
    BuildHook {
        /// フック定義（JSON、ターゲットからの相対パス）
        hook_file: String,
        /// フックグループID
        hook_group_id: String,
        /// フックID
        hook_id: String,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ログは stderr に出力（RUST_LOG、デフォルトは info）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "エラー:".red().bold(), error_message(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let source = ConfigSource {
        config: cli.config,
        secret: cli.secret,
    };

    match cli.command {
        Commands::Version => {
            println!("shipflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Build {
            dockerfile,
            write,
            push,
            image,
            registry,
            tags,
            build_args,
            build_tool,
            cache,
        } => {
            let target = Target::new(cli.target.as_deref())?;
            commands::build::handle(
                &target,
                &source,
                commands::build::BuildOptions {
                    dockerfile,
                    write,
                    push,
                    image,
                    registry,
                    tags,
                    build_args,
                    build_tool,
                    cache,
                },
            )
            .await?;
        }
        Commands::BuildCompose {
            compose_file,
            registry,
            write,
            build_retries,
            build_args,
            services,
            tags,
            build_tool,
            cache,
        } => {
            let target = Target::new(cli.target.as_deref())?;
            let write = write.map(std::path::absolute).transpose()?;
            commands::compose::handle(
                &target,
                commands::compose::ComposeArgs {
                    compose_file,
                    build_tool,
                    cache,
                    options: ComposeOptions {
                        registry: Some(registry),
                        write,
                        build_retries,
                        build_args,
                        services,
                        tags,
                    },
                },
            )
            .await?;
        }
        Commands::RetrieveArtifact {
            task_id,
            artifacts,
            output_path,
        } => {
            commands::artifacts::handle(&task_id, &artifacts, output_path.as_deref()).await?;
        }
        Commands::PushArtifact {
            task_id,
            artifact_filter,
            exclude_filter,
            push_tool,
        } => {
            let filter = PushFilter {
                include: artifact_filter,
                exclude: exclude_filter,
            };
            commands::push::handle(&source, &task_id, filter, push_tool).await?;
        }
        Commands::DeployHeroku {
            task_id,
            heroku_app,
            push_tool,
            artifacts,
        } => {
            commands::heroku::handle(&source, &task_id, &heroku_app, push_tool, &artifacts)
                .await?;
        }
        Commands::BuildHook {
            hook_file,
            hook_group_id,
            hook_id,
        } => {
            let target = Target::new(cli.target.as_deref())?;
            commands::hook::handle(&target, &hook_file, &hook_group_id, &hook_id).await?;
        }
    }

    Ok(())
}

/// ライブラリのエラーはヒント付きのメッセージで表示
fn error_message(error: &anyhow::Error) -> String {
    if let Some(e) = error.downcast_ref::<BuildError>() {
        return e.user_message();
    }
    if let Some(e) = error.downcast_ref::<ArtifactError>() {
        return e.user_message();
    }
    format!("{:#}", error)
}
