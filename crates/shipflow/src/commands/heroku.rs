use crate::utils::{ConfigSource, taskcluster_client};
use colored::Colorize;
use shipflow_artifact::{
    ArtifactResolver, ArtifactTransfer, HEROKU_REGISTRY, HerokuClient, HerokuRelease,
    parse_named_arguments,
};
use shipflow_build::{PushToolKind, create_pusher};

/// 名前付きアーティファクトを Heroku にリリース
pub async fn handle(
    source: &ConfigSource,
    task_id: &str,
    app: &str,
    push_tool: PushToolKind,
    artifacts: &[String],
) -> anyhow::Result<()> {
    // 引数の形式はダウンロード前に検証する
    let named = parse_named_arguments(artifacts)?;
    let auth = source.load().await?.heroku_auth()?;

    let mut pusher = create_pusher(push_tool)?;
    pusher
        .login(HEROKU_REGISTRY, &auth.username, &auth.password)
        .await?;

    let queue = taskcluster_client()?;
    let resolver = ArtifactResolver::new(&queue);
    let transfer = ArtifactTransfer::new(&queue);
    let client = HerokuClient::new(&auth.password);

    let release = HerokuRelease {
        app,
        resolver: &resolver,
        transfer: &transfer,
        pusher: pusher.as_ref(),
        client: &client,
    };
    let updates = release.run(task_id, &named).await?;

    println!("{}", format!("✓ {} を更新しました", app).green().bold());
    for update in &updates {
        println!("  {}: {}", update.dyno.cyan(), update.docker_image);
    }
    Ok(())
}
