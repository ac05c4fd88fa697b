use crate::utils::{ConfigSource, taskcluster_client};
use colored::Colorize;
use shipflow_artifact::{ArtifactResolver, ArtifactTransfer, PushFilter, push_artifacts};
use shipflow_build::{PushToolKind, create_pusher};

/// 依存タスクが生成したイメージをプッシュ
pub async fn handle(
    source: &ConfigSource,
    task_id: &str,
    filter: PushFilter,
    push_tool: PushToolKind,
) -> anyhow::Result<()> {
    let auth = source.load().await?.docker_auth()?;

    let mut pusher = create_pusher(push_tool)?;
    pusher
        .login(&auth.registry, &auth.username, &auth.password)
        .await?;

    let queue = taskcluster_client()?;
    let resolver = ArtifactResolver::new(&queue);
    let transfer = ArtifactTransfer::new(&queue);

    let pushed = push_artifacts(&resolver, &transfer, pusher.as_ref(), task_id, &filter).await?;

    println!(
        "{}",
        format!("✓ {} 個のイメージをプッシュしました", pushed.len())
            .green()
            .bold()
    );
    for tag in &pushed {
        println!("  {} {}", "→".green(), tag.cyan());
    }
    Ok(())
}
