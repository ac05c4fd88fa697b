use crate::error::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

/// デーモンに送るビルドコンテキスト
pub struct BuildContext {
    /// tar.gz アーカイブ
    pub data: Vec<u8>,
    /// コンテキスト内での Dockerfile のパス
    pub dockerfile: String,
}

/// コンテキストディレクトリを tar.gz にまとめる
///
/// Dockerfile がコンテキスト外にある場合は `Dockerfile` として追加する。
pub fn create_context(context_dir: &Path, dockerfile: &Path) -> Result<BuildContext> {
    tracing::debug!("Creating build context from: {}", context_dir.display());

    let inside = dockerfile
        .strip_prefix(context_dir)
        .ok()
        .map(|relative| relative.to_string_lossy().replace('\\', "/"));

    let mut data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut data, Compression::default());
        let mut tar = Builder::new(encoder);
        tar.append_dir_all(".", context_dir)?;

        if inside.is_none() {
            let content = std::fs::read(dockerfile)?;
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            tar.append_data(&mut header, "Dockerfile", content.as_slice())?;
        }

        tar.into_inner()?.finish()?;
    }

    tracing::debug!("Build context created: {} bytes", data.len());
    check_context_size(data.len());

    Ok(BuildContext {
        data,
        dockerfile: inside.unwrap_or_else(|| "Dockerfile".to_string()),
    })
}

fn check_context_size(size: usize) {
    const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

    if size > MAX_CONTEXT_SIZE {
        tracing::warn!(
            "Build context is large ({}MB), consider a .dockerignore file",
            size / 1024 / 1024
        );
    }
}
