//! イメージ名のパース
//!
//! `repository[:tag]` 形式のイメージ名を [`ImageRef`] に正規化します。
//! ローカルのビルドツールが返すイメージ一覧のエントリは [`LocalImage`] で表現します。

use crate::error::{CoreError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// タグ省略時のデフォルトタグ
pub const DEFAULT_TAG: &str = "latest";

/// ダイジェストのプレフィックス
pub const DIGEST_PREFIX: &str = "sha256:";

/// リポジトリ部分の文法
///
/// 先頭に `host:port/` 形式のレジストリを許容する。
static REPOSITORY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9_.\-]+:[0-9]+/)?[A-Za-z0-9_./\-]+$").unwrap()
});

/// パース済みのイメージ参照
///
/// `repository` にはレジストリを含むフルパスが入る。
/// `registry` は情報表示用で、比較には使用しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    /// イメージ名をパース
    ///
    /// # Examples
    /// - `nginx` -> `("nginx", "latest")`
    /// - `some/path/to/project:abcd` -> `("some/path/to/project", "abcd")`
    /// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidImageName(name.to_string());

        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (repository, tag) = split_image_tag(name);
        if !REPOSITORY_REGEX.is_match(&repository) {
            return Err(invalid());
        }

        Ok(Self {
            registry: registry_of(&repository),
            repository,
            tag,
        })
    }

    /// ローカルイメージと同一か（repository と tag のみ比較）
    pub fn matches(&self, image: &LocalImage) -> bool {
        self.repository == image.repository && self.tag == image.tag
    }
}

impl FromStr for ImageRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// イメージ名とタグを分離
///
/// 最後の `:` 以降に `/` が含まれない場合のみタグとみなす。
/// タグがない場合は `latest` を返す。
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", "v1.0")`
/// - `localhost:5000/app` -> `("localhost:5000/app", "latest")`
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some((name, tag)) = image.rsplit_once(':')
        && !tag.contains('/')
    {
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };
        return (name.to_string(), tag.to_string());
    }

    (image.to_string(), DEFAULT_TAG.to_string())
}

/// リポジトリ名の先頭セグメントがレジストリホストならそれを返す
fn registry_of(repository: &str) -> Option<String> {
    let (first, _) = repository.split_once('/')?;
    if first.contains('.') || first.contains(':') || first == "localhost" {
        Some(first.to_string())
    } else {
        None
    }
}

/// ビルドツールのローカル状態に存在するイメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: String,
    /// `sha256:` を除いた16進文字列
    pub digest: String,
}

impl LocalImage {
    pub fn new(
        registry: Option<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
        digest: &str,
    ) -> Self {
        Self {
            registry,
            repository: repository.into(),
            tag: tag.into(),
            digest: digest
                .strip_prefix(DIGEST_PREFIX)
                .unwrap_or(digest)
                .to_string(),
        }
    }

    /// `docker images` 形式のリポジトリ名から生成
    ///
    /// 3セグメント以上の場合のみ先頭をレジストリとして分離する
    /// （`registry.com/repo/test` -> `registry.com` + `repo/test`）。
    pub fn from_listing(repository: &str, tag: &str, digest: &str) -> Self {
        let parts: Vec<&str> = repository.split('/').collect();
        if parts.len() < 3 {
            Self::new(None, repository, tag, digest)
        } else {
            Self::new(Some(parts[0].to_string()), parts[1..].join("/"), tag, digest)
        }
    }

    /// ダイジェスト固定の参照を返す
    pub fn pinned_reference(&self) -> String {
        match &self.registry {
            Some(registry) => format!(
                "{}/{}@{}{}",
                registry, self.repository, DIGEST_PREFIX, self.digest
            ),
            None => format!("{}@{}{}", self.repository, DIGEST_PREFIX, self.digest),
        }
    }
}
