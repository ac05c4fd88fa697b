//! アーティファクトのダウンロード・展開・プッシュ

use crate::error::{ArtifactError, Result};
use crate::queue::{TaskArtifact, TaskQueue};
use futures_util::StreamExt;
use shipflow_build::ArchivePusher;
use shipflow_core::RetryPolicy;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

pub struct ArtifactTransfer<'a> {
    queue: &'a dyn TaskQueue,
    client: reqwest::Client,
    retry: RetryPolicy,
    temp_dir: Option<PathBuf>,
}

impl<'a> ArtifactTransfer<'a> {
    pub fn new(queue: &'a dyn TaskQueue) -> Self {
        Self::with_client(queue, reqwest::Client::new())
    }

    pub fn with_client(queue: &'a dyn TaskQueue, client: reqwest::Client) -> Self {
        Self {
            queue,
            client,
            retry: RetryPolicy::default(),
            temp_dir: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// ダウンロード先の一時ディレクトリ（デフォルトはシステムの一時ディレクトリ）
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    /// ストリーミングでダウンロードし、書き込んだバイト数を返す
    ///
    /// 10% ごとに進捗をログに出す。
    pub async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ArtifactError::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let total = match response.content_length() {
            Some(length) if length > 0 => length,
            _ => return Err(ArtifactError::MissingLength(url.to_string())),
        };

        let mut file = tokio::fs::File::create(destination).await?;
        info!("Writing artifact in {}", destination.display());

        let mut written: u64 = 0;
        let mut percent: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            let p = written * 100 / total;
            if p % 10 == 0 && p > percent {
                percent = p;
                info!("Written {} %", p);
            }
        }
        file.flush().await?;

        info!("Written {} with {} bytes", destination.display(), written);
        Ok(written)
    }

    /// アーティファクトを一時ファイル（`shipflow-*<ext>`）にダウンロード
    ///
    /// 4xx 以外の失敗はリトライする。失敗した場合は一時ファイルを残さない。
    #[tracing::instrument(skip(self), fields(task_id = %artifact.task_id, name = %artifact.name))]
    pub async fn download_artifact(&self, artifact: &TaskArtifact) -> Result<PathBuf> {
        info!("Download {} from {}", artifact.name, artifact.task_id);
        let url = self.queue.artifact_url(&artifact.task_id, &artifact.name)?;

        let suffix = Path::new(&artifact.name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("shipflow-").suffix(&suffix);
        let temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        self.retry
            .run_with_stop(
                || self.download(&url, temp.path()),
                ArtifactError::is_permanent,
            )
            .await?;

        let (_, path) = temp.keep().map_err(|e| e.error)?;
        Ok(path)
    }

    /// 展開してからプッシュし、プッシュしたタグを返す
    pub async fn push(
        &self,
        path: &Path,
        pusher: &dyn ArchivePusher,
        custom_tag: Option<&str>,
    ) -> Result<Vec<String>> {
        let archive = decompress(path)?;
        Ok(pusher.push_archive(&archive, custom_tag).await?)
    }
}

/// `.zst` / `.gz` を入力と同じディレクトリに展開する
///
/// 出力は拡張子を1つ取り除いたパス。それ以外のファイルはそのまま返す。
pub fn decompress(path: &Path) -> Result<PathBuf> {
    let extension = path.extension().and_then(|e| e.to_str());
    if !matches!(extension, Some("zst") | Some("gz")) {
        return Ok(path.to_path_buf());
    }

    let output = path.with_extension("");
    let input = BufReader::new(File::open(path)?);
    let mut writer = File::create(&output)?;

    match extension {
        Some("zst") => zstd::stream::copy_decode(input, &mut writer)?,
        _ => {
            let mut decoder = flate2::read::GzDecoder::new(input);
            std::io::copy(&mut decoder, &mut writer)?;
        }
    }

    info!("Decompressed {} to {}", path.display(), output.display());
    Ok(output)
}
