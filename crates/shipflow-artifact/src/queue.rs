//! Taskcluster queue / secrets API クライアント
//!
//! タスクの依存関係とアーティファクト一覧を取得します。
//! タスク内では `TASKCLUSTER_PROXY_URL` のプロキシがリクエストに署名します。
//! プロキシを使わず認証情報がある場合は Hawk で署名し、
//! アーティファクトのURLには bewit を付与します。認証情報がなければ署名しません。

use crate::error::{ArtifactError, Result};
use async_trait::async_trait;
use hawk::{Credentials, DigestAlgorithm, Key, RequestBuilder};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shipflow_config::{TaskclusterCredentials, TaskclusterOptions};
use std::time::Duration;
use tracing::debug;

/// 署名付きURLの有効期間
const BEWIT_TTL: Duration = Duration::from_secs(15 * 60);

/// 依存タスクが公開したアーティファクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskArtifact {
    pub task_id: String,
    pub name: String,
}

impl TaskArtifact {
    pub fn new(task_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
        }
    }
}

/// アーティファクト一覧の1ページ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPage {
    pub names: Vec<String>,
    pub continuation_token: Option<String>,
}

/// タスクグラフへのアクセス
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// タスクが依存するタスクID（宣言順）
    async fn task_dependencies(&self, task_id: &str) -> Result<Vec<String>>;

    /// 最新 run のアーティファクト一覧
    async fn list_latest_artifacts(
        &self,
        task_id: &str,
        continuation_token: Option<&str>,
    ) -> Result<ArtifactPage>;

    /// アーティファクトのダウンロードURL（必要なら署名付き）
    fn artifact_url(&self, task_id: &str, name: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TaskDefinition {
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactListing {
    #[serde(default)]
    artifacts: Vec<ArtifactEntry>,
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtifactEntry {
    name: String,
}

/// Taskcluster REST API クライアント
pub struct TaskclusterClient {
    client: reqwest::Client,
    root_url: Url,
    credentials: Option<Credentials>,
}

impl TaskclusterClient {
    pub fn new(options: &TaskclusterOptions) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), &options.root_url)?
            .with_credentials(options.credentials.as_ref())
    }

    pub fn with_client(client: reqwest::Client, root_url: &str) -> Result<Self> {
        let root_url = Url::parse(root_url).map_err(|e| ArtifactError::InvalidUrl {
            url: root_url.to_string(),
            message: e.to_string(),
        })?;
        if root_url.cannot_be_a_base() {
            return Err(ArtifactError::InvalidUrl {
                url: root_url.to_string(),
                message: "not a base URL".to_string(),
            });
        }
        Ok(Self {
            client,
            root_url,
            credentials: None,
        })
    }

    /// Hawk 署名に使う認証情報を設定
    pub fn with_credentials(mut self, credentials: Option<&TaskclusterCredentials>) -> Result<Self> {
        self.credentials = match credentials {
            Some(credentials) => {
                let key = Key::new(credentials.access_token.as_bytes(), DigestAlgorithm::Sha256)
                    .map_err(signing_error)?;
                debug!("Signing requests as {}", credentials.client_id);
                Some(Credentials {
                    id: credentials.client_id.clone(),
                    key,
                })
            }
            None => None,
        };
        Ok(self)
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// `{root}/api/{service}/v1/...` を組み立てる
    ///
    /// `/` を含む値（アーティファクト名、シークレット名）はパス区切りとして残す。
    pub(crate) fn endpoint(&self, service: &str, segments: &[&str]) -> Url {
        let mut url = self.root_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", service, "v1"]);
            for segment in segments {
                path.extend(segment.split('/'));
            }
        }
        url
    }

    /// Hawk の `Authorization` ヘッダー値（認証情報がなければ None）
    fn authorization(&self, method: &Method, url: &Url) -> Result<Option<String>> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };
        let target = HawkTarget::from_url(url)?;
        let header = RequestBuilder::new(method.as_str(), &target.host, target.port, &target.resource)
            .request()
            .make_header(credentials)
            .map_err(signing_error)?;
        Ok(Some(format!("Hawk {}", header)))
    }

    /// GET 用の署名付きURL（認証情報がなければそのまま返す）
    pub(crate) fn signed_url(&self, url: Url) -> Result<Url> {
        let Some(credentials) = &self.credentials else {
            return Ok(url);
        };
        let target = HawkTarget::from_url(&url)?;
        let bewit = RequestBuilder::new("GET", &target.host, target.port, &target.resource)
            .request()
            .make_bewit_with_ttl(credentials, BEWIT_TTL)
            .map_err(signing_error)?
            .to_str();

        let mut url = url;
        url.query_pairs_mut().append_pair("bewit", &bewit);
        Ok(url)
    }

    /// リクエストを送信し、2xx 以外はエラーにする
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        debug!("{} {}", method, url);
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(authorization) = self.authorization(&method, &url)? {
            request = request.header(reqwest::header::AUTHORIZATION, authorization);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ArtifactError::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        Ok(self.send(Method::GET, url, None).await?.json().await?)
    }

    /// シークレットを取得（`{"secret": {...}, ...}` をそのまま返す）
    #[tracing::instrument(skip(self))]
    pub async fn secret(&self, name: &str) -> Result<serde_json::Value> {
        self.get_json(self.endpoint("secrets", &["secret", name]))
            .await
    }
}

/// Hawk の MAC 計算対象（ホスト、ポート、パス＋クエリ）
struct HawkTarget {
    host: String,
    port: u16,
    resource: String,
}

impl HawkTarget {
    fn from_url(url: &Url) -> Result<Self> {
        let invalid = |message: &str| ArtifactError::InvalidUrl {
            url: url.to_string(),
            message: message.to_string(),
        };
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;
        let resource = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        Ok(Self {
            host: host.to_string(),
            port,
            resource,
        })
    }
}

fn signing_error(error: hawk::Error) -> ArtifactError {
    ArtifactError::Signing(error.to_string())
}

#[async_trait]
impl TaskQueue for TaskclusterClient {
    async fn task_dependencies(&self, task_id: &str) -> Result<Vec<String>> {
        let task: TaskDefinition = self
            .get_json(self.endpoint("queue", &["task", task_id]))
            .await?;
        Ok(task.dependencies)
    }

    async fn list_latest_artifacts(
        &self,
        task_id: &str,
        continuation_token: Option<&str>,
    ) -> Result<ArtifactPage> {
        let mut url = self.endpoint("queue", &["task", task_id, "artifacts"]);
        if let Some(token) = continuation_token {
            url.query_pairs_mut()
                .append_pair("continuationToken", token);
        }

        let listing: ArtifactListing = self.get_json(url).await?;
        Ok(ArtifactPage {
            names: listing.artifacts.into_iter().map(|a| a.name).collect(),
            continuation_token: listing.continuation_token,
        })
    }

    fn artifact_url(&self, task_id: &str, name: &str) -> Result<String> {
        let url = self.endpoint("queue", &["task", task_id, "artifacts", name]);
        Ok(self.signed_url(url)?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{http_response, serve, test_client};
    use base64::Engine;

    #[test]
    fn test_artifact_url_keeps_path() {
        let client =
            TaskclusterClient::with_client(test_client(), "http://taskcluster/").unwrap();
        assert_eq!(
            client
                .artifact_url("abc123", "public/build/image.tar.zst")
                .unwrap(),
            "http://taskcluster/api/queue/v1/task/abc123/artifacts/public/build/image.tar.zst"
        );
    }

    #[test]
    fn test_invalid_root_url() {
        assert!(matches!(
            TaskclusterClient::with_client(test_client(), "not a url"),
            Err(ArtifactError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_task_dependencies() {
        let (url, server) = serve(vec![http_response(
            200,
            r#"{"dependencies": ["dep1", "dep2"], "payload": {}}"#,
        )])
        .await;
        let client = TaskclusterClient::with_client(test_client(), &url).unwrap();

        let deps = client.task_dependencies("root").await.unwrap();
        assert_eq!(deps, vec!["dep1", "dep2"]);

        let requests = server.await.unwrap();
        assert_eq!(requests[0].line(), "GET /api/queue/v1/task/root");
    }

    #[tokio::test]
    async fn test_list_artifacts_with_continuation() {
        let (url, server) = serve(vec![http_response(
            200,
            r#"{"artifacts": [{"name": "public/a.tar", "storageType": "s3"}], "continuationToken": "next"}"#,
        )])
        .await;
        let client = TaskclusterClient::with_client(test_client(), &url).unwrap();

        let page = client
            .list_latest_artifacts("dep1", Some("tok/1"))
            .await
            .unwrap();
        assert_eq!(page.names, vec!["public/a.tar"]);
        assert_eq!(page.continuation_token.as_deref(), Some("next"));

        let requests = server.await.unwrap();
        assert_eq!(
            requests[0].line(),
            "GET /api/queue/v1/task/dep1/artifacts?continuationToken=tok%2F1"
        );
    }

    #[tokio::test]
    async fn test_http_error() {
        let (url, _server) = serve(vec![http_response(404, "{}")]).await;
        let client = TaskclusterClient::with_client(test_client(), &url).unwrap();

        let err = client.task_dependencies("missing").await.unwrap_err();
        assert!(matches!(err, ArtifactError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_secret() {
        let (url, server) = serve(vec![http_response(
            200,
            r#"{"secret": {"docker": {"registry": "r"}}, "expires": "2030-01-01T00:00:00.000Z"}"#,
        )])
        .await;
        let client = TaskclusterClient::with_client(test_client(), &url).unwrap();

        let value = client.secret("project/app/deploy").await.unwrap();
        assert_eq!(value["secret"]["docker"]["registry"], "r");

        let requests = server.await.unwrap();
        assert_eq!(requests[0].line(), "GET /api/secrets/v1/secret/project/app/deploy");
        assert_eq!(requests[0].header("authorization"), None);
    }

    fn credentials() -> TaskclusterCredentials {
        TaskclusterCredentials {
            client_id: "project/shipflow/ci".to_string(),
            access_token: "s3cr3t-token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_secret_signed_with_credentials() {
        let (url, server) = serve(vec![http_response(200, r#"{"secret": {}}"#)]).await;
        let client = TaskclusterClient::with_client(test_client(), &url)
            .unwrap()
            .with_credentials(Some(&credentials()))
            .unwrap();
        assert!(client.is_authenticated());

        client.secret("project/app/deploy").await.unwrap();

        let requests = server.await.unwrap();
        let authorization = requests[0].header("authorization").unwrap();
        assert!(authorization.starts_with("Hawk "));
        assert!(authorization.contains(r#"id="project/shipflow/ci""#));
        assert!(authorization.contains("mac="));
        assert!(!authorization.contains("s3cr3t-token"));
    }

    #[test]
    fn test_artifact_url_with_bewit() {
        let client = TaskclusterClient::with_client(test_client(), "https://tc.example.com")
            .unwrap()
            .with_credentials(Some(&credentials()))
            .unwrap();

        let url = Url::parse(&client.artifact_url("abc123", "public/image.tar").unwrap()).unwrap();
        assert_eq!(url.path(), "/api/queue/v1/task/abc123/artifacts/public/image.tar");

        let bewit = url
            .query_pairs()
            .find(|(key, _)| key == "bewit")
            .map(|(_, value)| value.into_owned())
            .unwrap();
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(bewit)
            .unwrap();
        let decoded = String::from_utf8(decoded).unwrap();
        // id\exp\mac\ext
        assert!(decoded.starts_with("project/shipflow/ci\\"));
        assert_eq!(decoded.split('\\').count(), 4);
    }

    #[test]
    fn test_artifact_url_unsigned_without_credentials() {
        let client = TaskclusterClient::with_client(test_client(), "https://tc.example.com").unwrap();
        assert!(!client.is_authenticated());
        let url = client.artifact_url("abc123", "public/image.tar").unwrap();
        assert!(!url.contains("bewit"));
    }
}
