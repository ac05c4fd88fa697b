//! shipflow の設定
//!
//! レジストリや Heroku の認証情報を、設定ファイル・環境変数・
//! Taskcluster シークレットのいずれかから読み込みます。

pub mod error;

pub use error::*;

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// 環境変数のプレフィックス（`SHIPFLOW__DOCKER__PASSWORD` など）
pub const ENV_PREFIX: &str = "SHIPFLOW";
pub const ENV_SEPARATOR: &str = "__";

/// Taskcluster のデフォルトのルートURL
pub const TASKCLUSTER_DEFAULT_URL: &str = "https://taskcluster.net";

/// 旧デプロイメントの UI
pub const TASKCLUSTER_DASHBOARD_URL: &str = "https://tools.taskcluster.net";

const REDACTED: &str = "***";

/// 認証情報の設定
///
/// 各セクションは部分的に指定されていても読み込める。
/// 使用時に [`Configuration::docker_auth`] などで必須項目を検証する。
#[derive(Clone, Default, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub docker: Option<DockerSection>,
    #[serde(default)]
    pub heroku: Option<HerokuSection>,
}

#[derive(Clone, Default, Deserialize)]
pub struct DockerSection {
    pub registry: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
pub struct HerokuSection {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// レジストリの認証情報
#[derive(Clone, PartialEq, Eq)]
pub struct DockerAuth {
    pub registry: String,
    pub username: String,
    pub password: String,
}

/// Heroku の認証情報（password は API トークン）
#[derive(Clone, PartialEq, Eq)]
pub struct HerokuAuth {
    pub username: String,
    pub password: String,
}

impl Configuration {
    /// 設定ファイルを読み込み、環境変数で上書き
    ///
    /// 形式は拡張子（yml / yaml / json / toml）で判定する。
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
        }
        tracing::info!("Loading configuration from {}", path.display());

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(env_source())
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// 環境変数のみから読み込む
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder().add_source(env_source()).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Taskcluster シークレットの内容から読み込む
    ///
    /// ペイロードは `{"secret": {...}}` の形式であること。
    pub fn from_secret(payload: &serde_json::Value) -> Result<Self> {
        let secret = payload
            .get("secret")
            .ok_or_else(|| ConfigError::InvalidSecret("missing secret value".to_string()))?;
        if !secret.is_object() {
            return Err(ConfigError::InvalidSecret(
                "secret value must be an object".to_string(),
            ));
        }

        serde_json::from_value(secret.clone()).map_err(|e| ConfigError::InvalidSecret(e.to_string()))
    }

    /// 認証情報が1つも設定されていないか
    pub fn is_empty(&self) -> bool {
        self.docker.is_none() && self.heroku.is_none()
    }

    pub fn has_docker_auth(&self) -> bool {
        self.docker_auth().is_ok()
    }

    /// Docker の認証情報（すべての項目が必須）
    pub fn docker_auth(&self) -> Result<DockerAuth> {
        let section = self.docker.as_ref().ok_or(ConfigError::MissingDockerAuth)?;
        match (&section.registry, &section.username, &section.password) {
            (Some(registry), Some(username), Some(password)) => Ok(DockerAuth {
                registry: registry.clone(),
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(ConfigError::MissingDockerAuth),
        }
    }

    /// Heroku の認証情報（すべての項目が必須）
    pub fn heroku_auth(&self) -> Result<HerokuAuth> {
        let section = self.heroku.as_ref().ok_or(ConfigError::MissingHerokuAuth)?;
        match (&section.username, &section.password) {
            (Some(username), Some(password)) => Ok(HerokuAuth {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(ConfigError::MissingHerokuAuth),
        }
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| REDACTED)
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("docker", &self.docker)
            .field("heroku", &self.heroku)
            .finish()
    }
}

impl fmt::Debug for DockerSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerSection")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

impl fmt::Debug for HerokuSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HerokuSection")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

impl fmt::Debug for DockerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerAuth")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for HerokuAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HerokuAuth")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Taskcluster のクライアント認証情報（Hawk 署名に使用）
#[derive(Clone, PartialEq, Eq)]
pub struct TaskclusterCredentials {
    pub client_id: String,
    pub access_token: String,
}

impl fmt::Debug for TaskclusterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskclusterCredentials")
            .field("client_id", &self.client_id)
            .field("access_token", &REDACTED)
            .finish()
    }
}

/// Taskcluster の接続先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskclusterOptions {
    pub root_url: String,
    /// タスク内のプロキシ経由か（プロキシがリクエストに署名する）
    pub via_proxy: bool,
    /// プロキシを使わない場合の認証情報
    pub credentials: Option<TaskclusterCredentials>,
}

impl TaskclusterOptions {
    /// 環境変数から接続先を決定
    ///
    /// 1. `TASKCLUSTER_PROXY_URL`（タスク内）
    /// 2. `TASKCLUSTER_ROOT_URL`
    /// 3. `https://taskcluster.net`
    ///
    /// プロキシを使わない場合は `TASKCLUSTER_CLIENT_ID` と
    /// `TASKCLUSTER_ACCESS_TOKEN` が揃っていれば認証情報として読み込む。
    pub fn from_env() -> Self {
        if let Some(proxy_url) = non_empty_var("TASKCLUSTER_PROXY_URL") {
            return Self {
                root_url: proxy_url,
                via_proxy: true,
                credentials: None,
            };
        }

        let credentials = match (
            non_empty_var("TASKCLUSTER_CLIENT_ID"),
            non_empty_var("TASKCLUSTER_ACCESS_TOKEN"),
        ) {
            (Some(client_id), Some(access_token)) => Some(TaskclusterCredentials {
                client_id,
                access_token,
            }),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("Incomplete Taskcluster credentials, requests will not be signed");
                None
            }
            (None, None) => None,
        };

        Self {
            root_url: non_empty_var("TASKCLUSTER_ROOT_URL")
                .unwrap_or_else(|| TASKCLUSTER_DEFAULT_URL.to_string()),
            via_proxy: false,
            credentials,
        }
    }

    /// Taskcluster UI 上のページURL
    ///
    /// 旧 `taskcluster.net` デプロイメントのみ UI が別ホストにある。
    pub fn ui_url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.root_url.trim_end_matches('/') == TASKCLUSTER_DEFAULT_URL {
            format!("{}/{}", TASKCLUSTER_DASHBOARD_URL, path)
        } else {
            format!("{}/{}", self.root_url.trim_end_matches('/'), path)
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// shipflow の設定ディレクトリ
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("shipflow"))
}

/// デフォルトの設定ファイルパス（`<config_dir>/shipflow/config.yml`）
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.yml"))
}
