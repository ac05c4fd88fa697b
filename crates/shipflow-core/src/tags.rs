//! ビルドタグの生成

use crate::image::{DEFAULT_TAG, split_image_tag};
use std::collections::BTreeSet;
use std::fmt;

/// 完全修飾されたタグ（`registry/repository:tag`）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildTag(String);

impl BuildTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 指定レジストリ配下のタグか
    pub fn is_in_registry(&self, registry: &str) -> bool {
        self.0.starts_with(registry)
    }
}

impl fmt::Display for BuildTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BuildTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<BuildTag> for String {
    fn from(tag: BuildTag) -> Self {
        tag.0
    }
}

/// ベースイメージ名とタグ一覧からビルドタグを生成
///
/// - タグ未指定時は `latest`
/// - 重複を除いて辞書順にソート
/// - ベース名に付いているタグは取り除く
/// - `registry` 指定時、ベース名がそのレジストリで始まっていなければ付与
pub fn generate_tags(base_image: &str, tags: &[String], registry: Option<&str>) -> Vec<BuildTag> {
    let unique: BTreeSet<&str> = if tags.is_empty() {
        BTreeSet::from([DEFAULT_TAG])
    } else {
        tags.iter().map(String::as_str).collect()
    };

    let (mut base, _) = split_image_tag(base_image);
    if let Some(registry) = registry
        && !base.starts_with(registry)
    {
        base = format!("{}/{}", registry, base);
    }

    unique
        .into_iter()
        .map(|tag| BuildTag::new(format!("{}:{}", base, tag)))
        .collect()
}
