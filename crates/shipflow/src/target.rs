use std::path::{Path, PathBuf};

/// ビルド対象のディレクトリ
#[derive(Debug, Clone)]
pub struct Target {
    dir: PathBuf,
}

impl Target {
    /// 指定がなければカレントディレクトリ
    pub fn new(dir: Option<&Path>) -> anyhow::Result<Self> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let dir = dir
            .canonicalize()
            .map_err(|_| anyhow::anyhow!("Invalid target {}", dir.display()))?;
        anyhow::ensure!(dir.is_dir(), "Invalid target {}", dir.display());

        tracing::info!("Target setup in {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// ターゲット内に存在する相対パスを絶対パスに解決
    pub fn check_path(&self, path: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(!Path::new(path).is_absolute(), "No absolute paths: {}", path);

        let full_path = self.dir.join(path);
        anyhow::ensure!(full_path.exists(), "Missing file in target {}", path);
        Ok(full_path)
    }
}
