//! Heroku へのリリース
//!
//! 名前付きアーティファクト（`dyno:path`）を Heroku のレジストリへプッシュし、
//! formation API でイメージを切り替えます。

use crate::error::{ArtifactError, Result};
use crate::named::{DownloadedArtifact, NamedArtifact, load_named_artifacts};
use crate::resolver::ArtifactResolver;
use crate::transfer::{ArtifactTransfer, decompress};
use serde::Serialize;
use shipflow_build::ArchivePusher;
use shipflow_core::ManifestStore;
use tracing::{debug, info};

pub const HEROKU_REGISTRY: &str = "registry.heroku.com";
pub const HEROKU_API: &str = "https://api.heroku.com";
const HEROKU_ACCEPT: &str = "application/vnd.heroku+json; version=3.docker-releases";

/// dyno ごとのイメージ更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormationUpdate {
    #[serde(rename = "type")]
    pub dyno: String,
    pub docker_image: String,
}

#[derive(Debug, Serialize)]
struct FormationPayload<'a> {
    updates: &'a [FormationUpdate],
}

/// Heroku Platform API クライアント
pub struct HerokuClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl HerokuClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), HEROKU_API, token)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_base: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    /// formation を更新してリリースを作成
    #[tracing::instrument(skip(self, updates))]
    pub async fn update_formation(&self, app: &str, updates: &[FormationUpdate]) -> Result<()> {
        let mut dynos: Vec<&str> = updates.iter().map(|u| u.dyno.as_str()).collect();
        dynos.sort_unstable();
        info!("Deploying update for dyno types: {:?}", dynos);

        let url = format!("{}/apps/{}/formation", self.api_base.trim_end_matches('/'), app);
        let response = self
            .client
            .patch(&url)
            .header(reqwest::header::ACCEPT, HEROKU_ACCEPT)
            .bearer_auth(&self.token)
            .json(&FormationPayload { updates })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!("Heroku deployment answer: {}", body);
        if !status.is_success() {
            return Err(ArtifactError::Http {
                status: status.as_u16(),
                url,
            });
        }

        info!("The {} application has been updated", app);
        Ok(())
    }
}

/// Heroku リリースの手順
///
/// `pusher` は `registry.heroku.com` にログイン済みであること。
pub struct HerokuRelease<'a> {
    pub app: &'a str,
    pub resolver: &'a ArtifactResolver<'a>,
    pub transfer: &'a ArtifactTransfer<'a>,
    pub pusher: &'a dyn ArchivePusher,
    pub client: &'a HerokuClient,
}

impl HerokuRelease<'_> {
    pub fn image_tag(app: &str, dyno: &str) -> String {
        format!("{}/{}/{}", HEROKU_REGISTRY, app, dyno)
    }

    #[tracing::instrument(skip(self, named), fields(app = self.app))]
    pub async fn run(&self, root_task_id: &str, named: &[NamedArtifact]) -> Result<Vec<FormationUpdate>> {
        let downloaded =
            load_named_artifacts(self.resolver, self.transfer, root_task_id, named).await?;

        let mut updates = Vec::with_capacity(downloaded.len());
        for DownloadedArtifact { name, path, .. } in &downloaded {
            let archive = decompress(path)?;
            let tag = Self::image_tag(self.app, name);
            self.pusher.push_archive(&archive, Some(&tag)).await?;

            let docker_image = ManifestStore::open(&archive)?.image_id()?;
            updates.push(FormationUpdate {
                dyno: name.clone(),
                docker_image,
            });
        }

        self.client.update_formation(self.app, &updates).await?;
        Ok(updates)
    }
}
