use crate::target::Target;
use crate::utils::client_for;
use colored::Colorize;
use shipflow_artifact::{ArtifactError, HookOutcome, HooksClient};
use shipflow_config::TaskclusterOptions;
use tracing::info;

/// フック定義ファイルを読み込み、フックを作成または更新
pub async fn handle(
    target: &Target,
    hook_file: &str,
    group: &str,
    id: &str,
) -> anyhow::Result<()> {
    let path = target.check_path(hook_file)?;
    let definition: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)
        .map_err(|e| ArtifactError::InvalidHook(format!("{}: {}", path.display(), e)))?;

    let options = TaskclusterOptions::from_env();
    let client = client_for(&options)?;
    let outcome = HooksClient::new(&client)
        .ensure_hook(group, id, &definition)
        .await?;

    let hook_url = options.ui_url(&format!("hooks/{}/{}", group, id));
    info!("Hook URL for debugging: {}", hook_url);

    let message = match outcome {
        HookOutcome::Created => format!("✓ フック {}/{} を作成しました", group, id),
        HookOutcome::Updated => format!("✓ フック {}/{} を更新しました", group, id),
        HookOutcome::Unchanged => format!("✓ フック {}/{} は最新です", group, id),
    };
    println!("{}", message.green().bold());
    println!("  {}", hook_url.cyan());
    Ok(())
}
