//! Taskcluster hooks API
//!
//! JSON のフック定義からフックを作成、または既存のフックを更新します。
//! 既存の定義と同じ内容であれば更新しません。

use crate::error::{ArtifactError, Result};
use crate::queue::TaskclusterClient;
use reqwest::{Method, Url};
use serde_json::Value;
use std::fmt;
use tracing::info;

/// フックの反映結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookOutcome::Created => "created",
            HookOutcome::Updated => "updated",
            HookOutcome::Unchanged => "unchanged",
        })
    }
}

pub struct HooksClient<'a> {
    client: &'a TaskclusterClient,
}

impl<'a> HooksClient<'a> {
    pub fn new(client: &'a TaskclusterClient) -> Self {
        Self { client }
    }

    /// `hooks/{group}/{id}`（ID中の `/` はエンコードする）
    fn hook_url(&self, group: &str, id: &str) -> Url {
        let mut url = self.client.endpoint("hooks", &["hooks"]);
        if let Ok(mut path) = url.path_segments_mut() {
            path.push(group).push(id);
        }
        url
    }

    pub async fn ping(&self) -> Result<()> {
        self.client
            .send(Method::GET, self.client.endpoint("hooks", &["ping"]), None)
            .await?;
        Ok(())
    }

    /// 既存のフック定義（存在しなければ None）
    pub async fn hook(&self, group: &str, id: &str) -> Result<Option<Value>> {
        match self.client.get_json(self.hook_url(group, id)).await {
            Ok(hook) => Ok(Some(hook)),
            Err(ArtifactError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_hook(&self, group: &str, id: &str, definition: &Value) -> Result<Value> {
        let response = self
            .client
            .send(Method::PUT, self.hook_url(group, id), Some(definition))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn update_hook(&self, group: &str, id: &str, definition: &Value) -> Result<Value> {
        let response = self
            .client
            .send(Method::POST, self.hook_url(group, id), Some(definition))
            .await?;
        Ok(response.json().await?)
    }

    /// フックを定義どおりの状態にする
    #[tracing::instrument(skip(self, definition))]
    pub async fn ensure_hook(&self, group: &str, id: &str, definition: &Value) -> Result<HookOutcome> {
        if !definition.is_object() {
            return Err(ArtifactError::InvalidHook(
                "definition must be a JSON object".to_string(),
            ));
        }

        self.ping().await?;

        let name = format!("{}/{}", group, id);
        info!("Checking if hook {} exists", name);

        match self.hook(group, id).await? {
            Some(existing) if definition_matches(&existing, definition) => {
                info!("Hook {} is up to date", name);
                Ok(HookOutcome::Unchanged)
            }
            Some(_) => {
                info!("Hook {} exists", name);
                self.update_hook(group, id, definition).await?;
                info!("Hook {} was successfully updated", name);
                Ok(HookOutcome::Updated)
            }
            None => {
                info!("Hook {} does not exist", name);
                self.create_hook(group, id, definition).await?;
                info!("Hook {} was successfully created", name);
                Ok(HookOutcome::Created)
            }
        }
    }
}

/// 定義のキーがすべて既存のフックに同じ値で含まれているか
///
/// API が付与するキー（`hookGroupId` など）は比較しない。
pub fn definition_matches(existing: &Value, definition: &Value) -> bool {
    match (existing.as_object(), definition.as_object()) {
        (Some(existing), Some(definition)) => definition
            .iter()
            .all(|(key, value)| existing.get(key) == Some(value)),
        _ => existing == definition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{http_response, serve, test_client};
    use serde_json::json;

    fn definition() -> Value {
        json!({
            "metadata": {"name": "nightly", "owner": "ci@example.com"},
            "schedule": ["0 0 3 * * *"],
            "task": {"provisionerId": "proj-app", "workerType": "ci"},
        })
    }

    #[test]
    fn test_definition_matches_ignores_server_fields() {
        let mut existing = definition();
        existing["hookGroupId"] = json!("project-app");
        existing["hookId"] = json!("nightly");
        assert!(definition_matches(&existing, &definition()));

        existing["schedule"] = json!([]);
        assert!(!definition_matches(&existing, &definition()));
    }

    #[test]
    fn test_hook_url_encodes_ids() {
        let client = TaskclusterClient::with_client(test_client(), "http://taskcluster").unwrap();
        let hooks = HooksClient::new(&client);
        assert_eq!(
            hooks.hook_url("project-app", "nightly/build").as_str(),
            "http://taskcluster/api/hooks/v1/hooks/project-app/nightly%2Fbuild"
        );
    }

    #[tokio::test]
    async fn test_ensure_hook_creates_missing_hook() {
        let (url, server) = serve(vec![
            http_response(200, r#"{"alive": true}"#),
            http_response(404, r#"{"code": "ResourceNotFound"}"#),
            http_response(200, "{}"),
        ])
        .await;
        let client = TaskclusterClient::with_client(test_client(), &url).unwrap();

        let outcome = HooksClient::new(&client)
            .ensure_hook("project-app", "nightly", &definition())
            .await
            .unwrap();
        assert_eq!(outcome, HookOutcome::Created);

        let requests = server.await.unwrap();
        assert_eq!(requests[0].line(), "GET /api/hooks/v1/ping");
        assert_eq!(requests[1].line(), "GET /api/hooks/v1/hooks/project-app/nightly");
        assert_eq!(requests[2].line(), "PUT /api/hooks/v1/hooks/project-app/nightly");
        let sent: Value = serde_json::from_str(&requests[2].body).unwrap();
        assert_eq!(sent, definition());
    }

    #[tokio::test]
    async fn test_ensure_hook_updates_changed_hook() {
        let mut existing = definition();
        existing["schedule"] = json!(["0 0 1 * * *"]);
        let (url, server) = serve(vec![
            http_response(200, "{}"),
            http_response(200, &existing.to_string()),
            http_response(200, "{}"),
        ])
        .await;
        let client = TaskclusterClient::with_client(test_client(), &url).unwrap();

        let outcome = HooksClient::new(&client)
            .ensure_hook("project-app", "nightly", &definition())
            .await
            .unwrap();
        assert_eq!(outcome, HookOutcome::Updated);

        let requests = server.await.unwrap();
        assert_eq!(requests[2].line(), "POST /api/hooks/v1/hooks/project-app/nightly");
    }

    #[tokio::test]
    async fn test_ensure_hook_skips_identical_hook() {
        let mut existing = definition();
        existing["hookGroupId"] = json!("project-app");
        existing["hookId"] = json!("nightly");
        let (url, server) = serve(vec![
            http_response(200, "{}"),
            http_response(200, &existing.to_string()),
        ])
        .await;
        let client = TaskclusterClient::with_client(test_client(), &url).unwrap();

        let outcome = HooksClient::new(&client)
            .ensure_hook("project-app", "nightly", &definition())
            .await
            .unwrap();
        assert_eq!(outcome, HookOutcome::Unchanged);
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ensure_hook_propagates_server_errors() {
        let (url, _server) = serve(vec![
            http_response(200, "{}"),
            http_response(500, "{}"),
        ])
        .await;
        let client = TaskclusterClient::with_client(test_client(), &url).unwrap();

        let err = HooksClient::new(&client)
            .ensure_hook("project-app", "nightly", &definition())
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_ensure_hook_signs_requests() {
        let (url, server) = serve(vec![
            http_response(200, "{}"),
            http_response(404, "{}"),
            http_response(200, "{}"),
        ])
        .await;
        let credentials = shipflow_config::TaskclusterCredentials {
            client_id: "project/shipflow/ci".to_string(),
            access_token: "s3cr3t-token".to_string(),
        };
        let client = TaskclusterClient::with_client(test_client(), &url)
            .unwrap()
            .with_credentials(Some(&credentials))
            .unwrap();

        HooksClient::new(&client)
            .ensure_hook("project-app", "nightly", &definition())
            .await
            .unwrap();

        for request in server.await.unwrap() {
            let authorization = request.header("authorization").unwrap();
            assert!(authorization.starts_with("Hawk "));
        }
    }

    #[tokio::test]
    async fn test_ensure_hook_rejects_non_object() {
        let client = TaskclusterClient::with_client(test_client(), "http://127.0.0.1:9").unwrap();
        let err = HooksClient::new(&client)
            .ensure_hook("project-app", "nightly", &json!(["not", "a", "hook"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidHook(_)));
    }
}
