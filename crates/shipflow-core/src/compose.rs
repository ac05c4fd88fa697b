//! docker-compose ファイルのモデル
//!
//! ビルドに必要な項目（`image`, `build`）のみを読み込みます。
//! サービスはファイルに記述された順序で保持します。

use crate::error::{CoreError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ComposeFile {
    pub version: Option<String>,
    pub services: Vec<(String, ComposeService)>,
}

#[derive(Debug, Deserialize)]
struct RawCompose {
    version: Option<serde_yaml::Value>,
    services: Option<serde_yaml::Mapping>,
}

/// サービス定義
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposeService {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub build: Option<BuildSpec>,
}

/// `build` は文字列（コンテキスト）またはマッピング
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BuildSpec {
    Context(String),
    Detailed(BuildOptions),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildOptions {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub args: Option<BuildArgs>,
}

/// ビルド引数（マッピングまたは `KEY=VALUE` のリスト）
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BuildArgs {
    Map(serde_yaml::Mapping),
    List(Vec<String>),
}

/// 解決済みのビルド設定（パスは compose ファイルのディレクトリからの相対）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeBuild {
    pub context: PathBuf,
    pub dockerfile: PathBuf,
    pub args: Vec<String>,
}

impl ComposeFile {
    /// compose ファイルを読み込む
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(CoreError::ComposeFileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// compose ファイルをパース
    ///
    /// `version` が指定されている場合は 3 系のみ受け付ける。
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawCompose = serde_yaml::from_str(content)?;

        let version = raw.version.map(|v| match v {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            other => format!("{:?}", other),
        });

        match &version {
            Some(v) if v == "3" || v.starts_with("3.") => {}
            Some(v) => return Err(CoreError::UnsupportedComposeVersion(v.clone())),
            None => warn!("Compose file has no version, assuming version 3"),
        }

        let mapping = raw
            .services
            .ok_or_else(|| CoreError::InvalidCompose("missing services".to_string()))?;

        let mut services = Vec::with_capacity(mapping.len());
        for (name, value) in mapping {
            let name = name
                .as_str()
                .ok_or_else(|| CoreError::InvalidCompose(format!("invalid service name {:?}", name)))?
                .to_string();
            let service = if value.is_null() {
                ComposeService::default()
            } else {
                serde_yaml::from_value(value)?
            };
            services.push((name, service));
        }

        Ok(Self { version, services })
    }
}

impl ComposeService {
    /// ビルド設定を解決（`build` がなければ `None`）
    pub fn build_spec(&self) -> Option<ComposeBuild> {
        let build = self.build.as_ref()?;
        let (context, dockerfile, args) = match build {
            BuildSpec::Context(context) => (context.as_str(), None, None),
            BuildSpec::Detailed(options) => (
                options.context.as_deref().unwrap_or("."),
                options.dockerfile.as_deref(),
                options.args.as_ref(),
            ),
        };

        Some(ComposeBuild {
            context: PathBuf::from(context),
            dockerfile: PathBuf::from(dockerfile.unwrap_or("Dockerfile")),
            args: args.map(BuildArgs::to_args).unwrap_or_default(),
        })
    }
}

impl BuildArgs {
    /// `--build-arg` に渡す `KEY=VALUE` 形式に変換
    pub fn to_args(&self) -> Vec<String> {
        match self {
            BuildArgs::List(list) => list.clone(),
            BuildArgs::Map(map) => map
                .iter()
                .filter_map(|(key, value)| {
                    let key = scalar(key)?;
                    Some(match value {
                        serde_yaml::Value::Null => key,
                        value => format!("{}={}", key, scalar(value).unwrap_or_default()),
                    })
                })
                .collect(),
        }
    }
}

fn scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
