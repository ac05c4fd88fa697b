//! 保存済みイメージアーカイブのマニフェスト操作
//!
//! `docker save` 形式の TAR に含まれる `manifest.json` を読み書きします。
//! 古い形式の `repositories` ファイルは読み込みのみ対応します。
//!
//! 書き込みは同じディレクトリの一時ファイルに `manifest.json` 以外のメンバーを
//! コピーし、新しいマニフェストを追記してからアトミックにリネームします。

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const REPOSITORIES_FILE: &str = "repositories";
pub const OCI_LAYOUT_FILE: &str = "oci-layout";

/// マニフェストの1エントリ（1イメージ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "Config")]
    pub config_file: String,

    #[serde(rename = "Layers", default)]
    pub layers: Vec<String>,

    #[serde(rename = "RepoTags", default, deserialize_with = "null_as_empty")]
    pub repo_tags: Vec<String>,

    /// `LayerSources` など未知のキー
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// アーカイブ走査の結果
#[derive(Default)]
struct ArchiveMembers {
    manifest: Option<Vec<u8>>,
    repositories: Option<Vec<u8>>,
    oci_layout: bool,
}

/// イメージアーカイブ
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// アーカイブを開く
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(CoreError::ArchiveNotFound(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// マニフェストを読み込む
    ///
    /// 複数の `manifest.json` がある場合は最後のものを使用する。
    pub fn read(&self) -> Result<Vec<ManifestEntry>> {
        let members = self.scan()?;

        if let Some(manifest) = members.manifest {
            return serde_json::from_slice(&manifest)
                .map_err(|e| CoreError::archive(&self.path, format!("invalid {}: {}", MANIFEST_FILE, e)));
        }

        if let Some(repositories) = members.repositories {
            debug!("Reading legacy {} file", REPOSITORIES_FILE);
            return self.read_legacy(&repositories);
        }

        Err(CoreError::archive(
            &self.path,
            format!("missing {} or {}", MANIFEST_FILE, REPOSITORIES_FILE),
        ))
    }

    /// `{repo: {tag: id}}` をイメージID単位のエントリに変換
    fn read_legacy(&self, content: &[u8]) -> Result<Vec<ManifestEntry>> {
        let repositories: BTreeMap<String, BTreeMap<String, String>> =
            serde_json::from_slice(content).map_err(|e| {
                CoreError::archive(&self.path, format!("invalid {}: {}", REPOSITORIES_FILE, e))
            })?;

        let mut entries: Vec<ManifestEntry> = Vec::new();
        for (repository, tags) in repositories {
            for (tag, image_id) in tags {
                let repo_tag = format!("{}:{}", repository, tag);
                let config_file = format!("{}/json", image_id);

                match entries.iter_mut().find(|e| e.config_file == config_file) {
                    Some(entry) => entry.repo_tags.push(repo_tag),
                    None => entries.push(ManifestEntry {
                        config_file,
                        layers: vec![format!("{}/layer.tar", image_id)],
                        repo_tags: vec![repo_tag],
                        extra: serde_json::Map::new(),
                    }),
                }
            }
        }

        Ok(entries)
    }

    /// マニフェストを書き込む
    #[tracing::instrument(skip(self, entries), fields(path = %self.path.display()))]
    pub fn write(&self, entries: &[ManifestEntry]) -> Result<()> {
        if entries.is_empty() {
            return Err(CoreError::archive(&self.path, "no manifest entries to write"));
        }
        if let Some(entry) = entries.iter().find(|e| e.repo_tags.is_empty()) {
            return Err(CoreError::archive(
                &self.path,
                format!("manifest entry {} has no tags", entry.config_file),
            ));
        }
        if !self.path.is_file() {
            return Err(CoreError::ArchiveNotFound(self.path.clone()));
        }

        let content = serde_json::to_vec(entries)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut builder = tar::Builder::new(staged.as_file_mut());
            let mut archive = tar::Archive::new(File::open(&self.path)?);

            for entry in archive.entries().map_err(|e| CoreError::archive(&self.path, e))? {
                let mut entry = entry.map_err(|e| CoreError::archive(&self.path, e))?;
                if member_name(&entry)? == MANIFEST_FILE {
                    continue;
                }

                let mut header = entry.header().clone();
                let path = entry.path()?.into_owned();
                let entry_type = header.entry_type();
                let link = entry.link_name()?.map(|target| target.into_owned());

                match link {
                    Some(target) if entry_type.is_symlink() || entry_type.is_hard_link() => {
                        builder.append_link(&mut header, &path, &target)?;
                    }
                    _ => builder.append_data(&mut header, &path, &mut entry)?,
                }
            }

            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default(),
            );
            builder.append_data(&mut header, MANIFEST_FILE, content.as_slice())?;
            builder.into_inner()?;
        }

        staged.persist(&self.path).map_err(|e| e.error)?;
        info!("Updated {} in {}", MANIFEST_FILE, self.path.display());
        Ok(())
    }

    /// 全エントリのタグ（順序を保って重複除去）
    pub fn tags(&self) -> Result<Vec<String>> {
        let mut tags: Vec<String> = Vec::new();
        for entry in self.read()? {
            for tag in entry.repo_tags {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }

        if tags.is_empty() {
            return Err(CoreError::archive(&self.path, "no tags in image archive"));
        }
        Ok(tags)
    }

    /// 先頭エントリのタグを置き換える
    pub fn retag(&self, tags: &[String]) -> Result<()> {
        let mut entries = self.read()?;
        let Some(first) = entries.first_mut() else {
            return Err(CoreError::archive(&self.path, "empty manifest"));
        };
        first.repo_tags = tags.to_vec();
        self.write(&entries)
    }

    /// 先頭エントリの設定ファイルの SHA-256（`sha256:<hex>`）
    pub fn image_id(&self) -> Result<String> {
        let entries = self.read()?;
        let Some(first) = entries.first() else {
            return Err(CoreError::archive(&self.path, "empty manifest"));
        };

        let config = self.read_member(&first.config_file)?.ok_or_else(|| {
            CoreError::archive(&self.path, format!("missing config file {}", first.config_file))
        })?;

        let digest = Sha256::digest(&config);
        Ok(format!("sha256:{}", hex::encode(digest)))
    }

    /// OCI レイアウトのアーカイブか
    pub fn is_oci_layout(&self) -> Result<bool> {
        Ok(self.scan()?.oci_layout)
    }

    fn scan(&self) -> Result<ArchiveMembers> {
        let mut members = ArchiveMembers::default();
        let mut archive = tar::Archive::new(File::open(&self.path)?);

        for entry in archive.entries().map_err(|e| CoreError::archive(&self.path, e))? {
            let mut entry = entry.map_err(|e| CoreError::archive(&self.path, e))?;
            match member_name(&entry)?.as_str() {
                MANIFEST_FILE => members.manifest = Some(read_entry(&mut entry)?),
                REPOSITORIES_FILE => members.repositories = Some(read_entry(&mut entry)?),
                OCI_LAYOUT_FILE => members.oci_layout = true,
                _ => {}
            }
        }

        Ok(members)
    }

    fn read_member(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let wanted = name.trim_start_matches("./");
        let mut archive = tar::Archive::new(File::open(&self.path)?);

        for entry in archive.entries().map_err(|e| CoreError::archive(&self.path, e))? {
            let mut entry = entry.map_err(|e| CoreError::archive(&self.path, e))?;
            if member_name(&entry)? == wanted {
                return Ok(Some(read_entry(&mut entry)?));
            }
        }
        Ok(None)
    }
}

fn member_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String> {
    let path = entry.path()?;
    Ok(path.to_string_lossy().trim_start_matches("./").to_string())
}

fn read_entry<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

/// TAR アーカイブとして読めるか
pub fn is_tar_archive(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut archive = tar::Archive::new(file);
    match archive.entries() {
        Ok(mut entries) => matches!(entries.next(), Some(Ok(_))),
        Err(_) => false,
    }
}
