//! 依存タスクのイメージアーカイブをレジストリへプッシュ

use crate::error::Result;
use crate::resolver::ArtifactResolver;
use crate::transfer::ArtifactTransfer;
use shipflow_build::ArchivePusher;
use tracing::info;

/// プッシュ対象のフィルタ
#[derive(Debug, Clone)]
pub struct PushFilter {
    pub include: String,
    pub exclude: Option<String>,
}

impl Default for PushFilter {
    fn default() -> Self {
        Self {
            include: "public/**.tar.zst".to_string(),
            exclude: None,
        }
    }
}

/// 一致したアーティファクトを順にダウンロードしてプッシュ
///
/// `pusher` はログイン済みであること。1つでも失敗した時点で中断する。
#[tracing::instrument(skip(resolver, transfer, pusher), fields(tool = pusher.name()))]
pub async fn push_artifacts(
    resolver: &ArtifactResolver<'_>,
    transfer: &ArtifactTransfer<'_>,
    pusher: &dyn ArchivePusher,
    root_task_id: &str,
    filter: &PushFilter,
) -> Result<Vec<String>> {
    let artifacts = resolver
        .resolve(root_task_id, &filter.include, filter.exclude.as_deref())
        .await?;

    let mut pushed = Vec::new();
    for artifact in &artifacts {
        let path = transfer.download_artifact(artifact).await?;
        pushed.extend(transfer.push(&path, pusher, None).await?);
    }

    info!("All found artifacts were pushed.");
    Ok(pushed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::mock::MockQueue;
    use crate::test_server::{http_response, serve, test_client};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingPusher {
        contents: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArchivePusher for CountingPusher {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn login(&mut self, _: &str, _: &str, _: &str) -> shipflow_build::Result<()> {
            Ok(())
        }

        async fn push_archive(
            &self,
            path: &Path,
            _: Option<&str>,
        ) -> shipflow_build::Result<Vec<String>> {
            let content = std::fs::read_to_string(path)?;
            self.contents.lock().unwrap().push(content.clone());
            Ok(vec![format!("registry.com/{}", content)])
        }
    }

    #[tokio::test]
    async fn test_push_matching_artifacts() {
        let (url, server) = serve(vec![
            http_response(200, "web:1"),
            http_response(200, "api:1"),
        ])
        .await;
        let queue = MockQueue {
            base_url: url,
            ..Default::default()
        }
        .with_task("root", &["dep1", "dep2"])
        .with_artifacts("dep1", &["public/web.tar", "public/logs/live.log"])
        .with_artifacts("dep2", &["public/api.tar", "public/debug.tar"]);
        let resolver = ArtifactResolver::new(&queue);
        let transfer = ArtifactTransfer::with_client(&queue, test_client());
        let pusher = CountingPusher::default();

        let filter = PushFilter {
            include: "public/**.tar".to_string(),
            exclude: Some("*debug*".to_string()),
        };
        let pushed = push_artifacts(&resolver, &transfer, &pusher, "root", &filter)
            .await
            .unwrap();

        assert_eq!(pushed, vec!["registry.com/web:1", "registry.com/api:1"]);
        let requests = server.await.unwrap();
        assert_eq!(requests[0].line(), "GET /dep1/public/web.tar");
        assert_eq!(requests[1].line(), "GET /dep2/public/api.tar");
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(PushFilter::default().include, "public/**.tar.zst");
    }
}
