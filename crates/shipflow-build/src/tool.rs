//! 外部コマンドの実行
//!
//! PATH 上のバイナリを解決し、非同期のサブプロセスとして実行します。
//! 認証情報は標準入力経由でのみ渡し、引数やログには含めません。

use crate::error::{BuildError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// PATH 上で解決済みのコマンドラインツール
#[derive(Debug, Clone)]
pub struct Tool {
    name: String,
    binary: PathBuf,
}

impl Tool {
    /// PATH からバイナリを探す
    pub fn locate(name: &str) -> Result<Self> {
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        let binary =
            find_in_path(name, &path_var).ok_or_else(|| BuildError::ToolNotFound(name.to_string()))?;

        tracing::debug!("Using {} from {}", name, binary.display());
        Ok(Self {
            name: name.to_string(),
            binary,
        })
    }

    /// バイナリのパスを直接指定
    pub fn with_binary(name: impl Into<String>, binary: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, args: &[String]) -> Command {
        tracing::debug!("Running: {} {}", self.name, args.join(" "));
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    fn describe(&self, args: &[String]) -> String {
        match args.first() {
            Some(subcommand) => format!("{} {}", self.name, subcommand),
            None => self.name.clone(),
        }
    }

    /// 出力をそのまま端末に流して実行
    pub async fn run(&self, args: &[String]) -> Result<()> {
        let status = self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        if !status.success() {
            return Err(BuildError::CommandFailed {
                command: self.describe(args),
                message: status.to_string(),
            });
        }
        Ok(())
    }

    /// 標準入力にデータを渡して実行
    pub async fn run_with_input(&self, args: &[String], input: &[u8]) -> Result<()> {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(input).await?;
                stdin.shutdown().await
            }
            .await;
            // 入力を読まずに終了したプロセスは終了コードで判定する
            if let Err(e) = written
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e.into());
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                command: self.describe(args),
                message: failure_message(&output.status, &output.stderr),
            });
        }
        Ok(())
    }

    /// 標準出力を取得
    pub async fn output(&self, args: &[String]) -> Result<String> {
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                command: self.describe(args),
                message: failure_message(&output.status, &output.stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn failure_message(status: &std::process::ExitStatus, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, stderr)
    }
}

/// PATH 形式の文字列から実行可能ファイルを探す
pub fn find_in_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// テスト用のシェルスクリプトを作成
#[cfg(all(test, unix))]
pub(crate) fn fake_tool(dir: &Path, name: &str, script: &str) -> Tool {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    Tool::with_binary(name, path)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_in_path() {
        let dir = TempDir::new().unwrap();
        fake_tool(dir.path(), "docker", "exit 0");
        std::fs::write(dir.path().join("not-executable"), "").unwrap();

        let path_var = std::env::join_paths([Path::new("/nonexistent"), dir.path()]).unwrap();
        assert_eq!(
            find_in_path("docker", &path_var),
            Some(dir.path().join("docker"))
        );
        assert_eq!(find_in_path("not-executable", &path_var), None);
        assert_eq!(find_in_path("podman", &path_var), None);
    }

    #[tokio::test]
    async fn test_output_captures_stdout() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "echoer", "echo \"$@\"");

        let out = tool.output(&args(&["images", "--format", "x"])).await.unwrap();
        assert_eq!(out.trim(), "images --format x");
    }

    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(dir.path(), "broken", "echo 'no such image' >&2; exit 3");

        let err = tool.output(&args(&["push", "x"])).await.unwrap_err();
        match err {
            BuildError::CommandFailed { command, message } => {
                assert_eq!(command, "broken push");
                assert!(message.contains("no such image"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(tool.run(&args(&["build"])).await.is_err());
    }

    #[tokio::test]
    async fn test_run_with_input_uses_stdin() {
        let dir = TempDir::new().unwrap();
        let captured = dir.path().join("stdin.txt");
        let tool = fake_tool(
            dir.path(),
            "login",
            &format!("cat > {}", captured.display()),
        );

        tool.run_with_input(&args(&["login", "--password-stdin"]), b"s3cret")
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&captured).unwrap(), "s3cret");
    }
}
