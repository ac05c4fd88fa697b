//! skopeo によるアーカイブのコピー
//!
//! ビルド機能は持たず、保存済みアーカイブをレジストリへコピーするだけのツールです。
//! 認証情報は docker の config.json 形式の一時ファイル（0600）に書き出して渡します。

use crate::backend::{ArchivePusher, archive_tags, check_archive, ensure_registry};
use crate::error::{BuildError, Result};
use crate::tool::Tool;
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use shipflow_core::ManifestStore;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// 認証ファイル（`{"auths": {"https://registry/v1": {"auth": "..."}}}`）
#[derive(Debug, Serialize)]
struct AuthFile {
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Serialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: String,
}

impl AuthFile {
    fn new(registry: &str, username: &str, password: &str) -> Self {
        let pair = format!("{}:{}", username, password);
        let auth = base64::engine::general_purpose::STANDARD.encode(pair.as_bytes());
        let server = format!("https://{}/v1", registry);
        Self {
            auths: HashMap::from([(server, AuthEntry { auth })]),
        }
    }
}

struct Session {
    registry: String,
    auth_file: NamedTempFile,
}

pub struct Skopeo {
    tool: Tool,
    session: Option<Session>,
}

impl Skopeo {
    pub fn new() -> Result<Self> {
        Ok(Self::with_tool(Tool::locate("skopeo")?))
    }

    pub fn with_tool(tool: Tool) -> Self {
        Self {
            tool,
            session: None,
        }
    }
}

#[async_trait]
impl ArchivePusher for Skopeo {
    fn name(&self) -> &'static str {
        "skopeo"
    }

    async fn login(&mut self, registry: &str, username: &str, password: &str) -> Result<()> {
        let mut auth_file = tempfile::Builder::new().suffix("-skopeo.json").tempfile()?;
        let content = serde_json::to_vec(&AuthFile::new(registry, username, password))
            .map_err(std::io::Error::other)?;
        auth_file.write_all(&content)?;
        auth_file.flush()?;

        self.session = Some(Session {
            registry: registry.to_string(),
            auth_file,
        });
        info!("Authenticated on {} as {}", registry, username);
        Ok(())
    }

    async fn push_archive(&self, path: &Path, custom_tag: Option<&str>) -> Result<Vec<String>> {
        check_archive(path)?;
        let session = self.session.as_ref().ok_or(BuildError::NotLoggedIn)?;

        let tags = match custom_tag {
            Some(tag) => vec![tag.to_string()],
            None => archive_tags(path)?,
        };
        ensure_registry(&session.registry, &tags)?;

        let transport = if ManifestStore::open(path)?.is_oci_layout()? {
            "oci-archive"
        } else {
            "docker-archive"
        };

        for tag in &tags {
            info!("Pushing image as {}", tag);
            let args = vec![
                "copy".to_string(),
                "--authfile".to_string(),
                session.auth_file.path().display().to_string(),
                format!("{}:{}", transport, path.display()),
                format!("docker://{}", tag),
            ];
            self.tool
                .run(&args)
                .await
                .map_err(|e| e.into_push_failure(tag))?;
            info!("Push successful");
        }

        Ok(tags)
    }
}
