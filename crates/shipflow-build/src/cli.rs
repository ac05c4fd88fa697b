//! docker 互換 CLI の共通処理
//!
//! docker, podman, img はサブコマンドの体系がほぼ共通なので、
//! コマンドラインの組み立てをここにまとめます。
//! img のようにサブコマンドごとに `--state` が必要なツールは `state_args` で渡します。

use crate::backend::{archive_tags, check_archive, ensure_registry};
use crate::error::{BuildError, Result};
use crate::tool::Tool;
use shipflow_core::{BuildTag, LocalImage};
use std::path::Path;
use tracing::{info, warn};

/// `docker images --format` の出力形式
pub(crate) const LISTING_FORMAT: &str = "{{ .Repository }} {{ .Tag }} {{ .Digest }}";

pub(crate) struct CliEngine {
    tool: Tool,
    state_args: Vec<String>,
    registry: Option<String>,
}

impl CliEngine {
    pub(crate) fn new(tool: Tool) -> Self {
        Self {
            tool,
            state_args: Vec::new(),
            registry: None,
        }
    }

    /// 全サブコマンドの直後に付与する引数
    pub(crate) fn with_state_args(mut self, state_args: Vec<String>) -> Self {
        self.state_args = state_args;
        self
    }

    pub(crate) fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    fn args<I, S>(&self, subcommand: &str, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec![subcommand.to_string()];
        args.extend(self.state_args.iter().cloned());
        args.extend(rest.into_iter().map(Into::into));
        args
    }

    pub(crate) async fn login(&mut self, registry: &str, username: &str, password: &str) -> Result<()> {
        let args = self.args("login", ["--password-stdin", "-u", username, registry]);
        self.tool.run_with_input(&args, password.as_bytes()).await?;
        self.registry = Some(registry.to_string());
        info!("Authenticated on {} as {}", registry, username);
        Ok(())
    }

    /// サブコマンドの標準出力を取得
    pub(crate) async fn output(&self, subcommand: &str, rest: &[&str]) -> Result<String> {
        let args = self.args(subcommand, rest.iter().copied());
        self.tool.output(&args).await
    }

    pub(crate) async fn build(
        &self,
        context_dir: &Path,
        dockerfile: &Path,
        tags: &[BuildTag],
        build_args: &[String],
        extra_flags: &[&str],
    ) -> Result<()> {
        info!("Building docker image {}", dockerfile.display());

        let mut rest: Vec<String> = extra_flags.iter().map(|s| s.to_string()).collect();
        rest.push("--file".to_string());
        rest.push(dockerfile.display().to_string());
        for tag in tags {
            rest.push("--tag".to_string());
            rest.push(tag.to_string());
        }
        for build_arg in build_args {
            rest.push("--build-arg".to_string());
            rest.push(build_arg.clone());
        }
        rest.push(context_dir.display().to_string());

        let args = self.args("build", rest);
        self.tool
            .run(&args)
            .await
            .map_err(BuildError::into_build_failure)?;

        let names: Vec<&str> = tags.iter().map(BuildTag::as_str).collect();
        info!("Built image {}", names.join(", "));
        Ok(())
    }

    /// 指定したタグをアーカイブに保存
    pub(crate) async fn save(&self, tags: &[&BuildTag], output: &Path, extra_flags: &[&str]) -> Result<()> {
        let names: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        info!("Saving image with tags {} to {}", names.join(", "), output.display());

        let mut rest: Vec<String> = extra_flags.iter().map(|s| s.to_string()).collect();
        rest.push("--output".to_string());
        rest.push(output.display().to_string());
        rest.extend(names);

        let args = self.args("save", rest);
        self.tool.run(&args).await
    }

    pub(crate) async fn load(&self, path: &Path) -> Result<()> {
        info!("Loading image from {}", path.display());
        let args = self.args("load", ["--input".to_string(), path.display().to_string()]);
        self.tool.run(&args).await
    }

    pub(crate) async fn tag(&self, source: &str, target: &str) -> Result<()> {
        info!("Tagging {} with {}", source, target);
        let args = self.args("tag", [source, target]);
        self.tool.run(&args).await
    }

    pub(crate) async fn push(&self, tag: &str) -> Result<()> {
        info!("Pushing image {}", tag);
        let args = self.args("push", [tag]);
        self.tool
            .run(&args)
            .await
            .map_err(|e| e.into_push_failure(tag))
    }

    /// アーカイブを読み込み、タグごとにプッシュ
    pub(crate) async fn push_archive(&self, path: &Path, custom_tag: Option<&str>) -> Result<Vec<String>> {
        check_archive(path)?;
        let registry = self.registry().ok_or(BuildError::NotLoggedIn)?;

        let mut tags = archive_tags(path)?;
        self.load(path).await?;

        if let Some(custom_tag) = custom_tag {
            self.tag(&tags[0], custom_tag).await?;
            tags = vec![custom_tag.to_string()];
        }

        ensure_registry(registry, &tags)?;
        for tag in &tags {
            info!("Pushing image as {}", tag);
            self.push(tag).await?;
            info!("Push successful");
        }

        Ok(tags)
    }
}

/// `{{ .Repository }} {{ .Tag }} {{ .Digest }}` 形式の一覧をパース
///
/// ダイジェストのないイメージやパースできない行は警告を出してスキップする。
pub(crate) fn parse_listing(stdout: &str) -> Vec<LocalImage> {
    let mut images = Vec::new();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [repository, tag, digest] = fields.as_slice() else {
            warn!("Did not parse this image: {}", line);
            continue;
        };

        if *digest == "<none>" {
            warn!("Skipping image without digest: {}", line);
            continue;
        }

        images.push(LocalImage::from_listing(repository, tag, digest));
    }

    images
}
