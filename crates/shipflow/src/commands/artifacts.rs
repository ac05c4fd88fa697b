use crate::utils::taskcluster_client;
use shipflow_artifact::{
    ArtifactResolver, ArtifactTransfer, NamedArtifact, load_named_artifacts,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// 依存タスクのアーティファクトをダウンロード
pub async fn handle(
    task_id: &str,
    artifacts: &[String],
    output_path: Option<&Path>,
) -> anyhow::Result<()> {
    let queue = taskcluster_client()?;
    let resolver = ArtifactResolver::new(&queue);
    let transfer = ArtifactTransfer::new(&queue);

    let named: Vec<NamedArtifact> = artifacts
        .iter()
        .map(|path| NamedArtifact::from_path(path))
        .collect();

    if let Some(output) = output_path {
        std::fs::create_dir_all(output)?;
    }

    for downloaded in load_named_artifacts(&resolver, &transfer, task_id, &named).await? {
        let path = match output_path {
            Some(output) => move_into(&downloaded.path, output, &downloaded.artifact.name)?,
            None => downloaded.path,
        };
        info!(
            "{} has been downloaded to {}",
            downloaded.artifact.name,
            path.display()
        );
    }

    info!("All found artifacts were downloaded.");
    Ok(())
}

/// 一時ファイルを出力ディレクトリへ移す（ファイル名はアーティファクト名の末尾）
fn move_into(path: &Path, output: &Path, artifact_name: &str) -> anyhow::Result<PathBuf> {
    let file_name = Path::new(artifact_name)
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid artifact name {}", artifact_name))?;
    let destination = output.join(file_name);

    // 一時ディレクトリは別のファイルシステムの可能性がある（rename 不可）
    std::fs::copy(path, &destination)?;
    std::fs::remove_file(path)?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_into_uses_artifact_file_name() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("shipflow-123.zst");
        std::fs::write(&temp, "data").unwrap();
        let output = dir.path().join("out");
        std::fs::create_dir(&output).unwrap();

        let moved = move_into(&temp, &output, "public/build/image.tar.zst").unwrap();
        assert_eq!(moved, output.join("image.tar.zst"));
        assert_eq!(std::fs::read_to_string(&moved).unwrap(), "data");
        assert!(!temp.exists());
    }
}
