use shipflow_artifact::TaskclusterClient;
use shipflow_config::{Configuration, TaskclusterOptions, default_config_path};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 認証情報の読み込み元
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    pub config: Option<PathBuf>,
    pub secret: Option<String>,
}

impl ConfigSource {
    /// 優先順: Taskcluster シークレット → --config → デフォルトの設定ファイル → 環境変数
    pub async fn load(&self) -> anyhow::Result<Configuration> {
        if let Some(name) = &self.secret {
            info!("Loading Taskcluster secret {}", name);
            let options = TaskclusterOptions::from_env();
            let client = client_for(&options)?;
            if !options.via_proxy && !client.is_authenticated() {
                warn!("Fetching secret {} without Taskcluster credentials", name);
            }
            let payload = client.secret(name).await?;
            return Ok(Configuration::from_secret(&payload)?);
        }

        if let Some(path) = &self.config {
            return Ok(Configuration::load(path)?);
        }

        if let Some(path) = default_config_path().ok().filter(|p| p.is_file()) {
            return Ok(Configuration::load(&path)?);
        }

        let configuration = Configuration::from_env()?;
        if configuration.is_empty() {
            warn!("No configuration available");
        }
        Ok(configuration)
    }
}

/// 環境変数から Taskcluster クライアントを作成
pub fn taskcluster_client() -> anyhow::Result<TaskclusterClient> {
    client_for(&TaskclusterOptions::from_env())
}

pub fn client_for(options: &TaskclusterOptions) -> anyhow::Result<TaskclusterClient> {
    if options.via_proxy {
        info!("Using Taskcluster proxy at {}", options.root_url);
    } else if let Some(credentials) = &options.credentials {
        info!(
            "Using Taskcluster at {} as {}",
            options.root_url, credentials.client_id
        );
    } else {
        info!("Using Taskcluster at {} without credentials", options.root_url);
    }
    Ok(TaskclusterClient::new(options)?)
}

/// `--write` の出力先を検証（`.tar` で終わり、親ディレクトリが存在すること）
pub fn check_output_archive(path: &Path) -> anyhow::Result<PathBuf> {
    let output = std::path::absolute(path)?;
    anyhow::ensure!(
        output
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tar")),
        "Destination path must end in .tar: {}",
        output.display()
    );

    let parent = output.parent().unwrap_or(Path::new("/"));
    anyhow::ensure!(
        parent.is_dir(),
        "Destination directory does not exist: {}",
        parent.display()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_output_archive() {
        let dir = TempDir::new().unwrap();

        let ok = check_output_archive(&dir.path().join("image.TAR")).unwrap();
        assert!(ok.is_absolute());

        assert!(check_output_archive(&dir.path().join("image.tar.gz")).is_err());
        assert!(check_output_archive(&dir.path().join("missing/image.tar")).is_err());
    }

    #[tokio::test]
    async fn test_load_explicit_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            "docker:\n  registry: ghcr.io\n  username: ci\n  password: pw\n",
        )
        .unwrap();

        let source = ConfigSource {
            config: Some(path),
            secret: None,
        };
        let configuration = source.load().await.unwrap();
        assert_eq!(configuration.docker_auth().unwrap().registry, "ghcr.io");
    }
}
