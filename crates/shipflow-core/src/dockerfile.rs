//! Dockerfile の FROM ローカライズ
//!
//! ビルドツールのローカル状態に存在するイメージを参照している `FROM` 命令を
//! ダイジェスト固定の参照に書き換えます。FROM 以外のバイト列はそのまま保持します。

use crate::error::{CoreError, Result};
use crate::image::{ImageRef, LocalImage};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Dockerfile の FROM 命令をローカルイメージに書き換える
///
/// 置き換えた参照の数を返す。置き換えがなければファイルは書き込まない。
#[tracing::instrument(skip(known_images), fields(known = known_images.len()))]
pub fn localize(dockerfile: &Path, known_images: &[LocalImage]) -> Result<usize> {
    if !dockerfile.is_file() {
        return Err(CoreError::DockerfileNotFound(dockerfile.to_path_buf()));
    }

    if known_images.is_empty() {
        debug!("No local images, skipping localization");
        return Ok(0);
    }

    let content = fs::read_to_string(dockerfile)?;
    let (patched, replaced) = localize_content(&content, known_images);

    if replaced > 0 {
        fs::write(dockerfile, patched)?;
        info!("Patched {} parent image(s) in {}", replaced, dockerfile.display());
    }

    Ok(replaced)
}

/// 文字列版の FROM ローカライズ
///
/// `\` による行継続は1つの命令として扱う。`# escape=` ディレクティブで
/// エスケープ文字を変更した Dockerfile の継続行は認識しない。
pub fn localize_content(content: &str, known_images: &[LocalImage]) -> (String, usize) {
    let mut output = String::with_capacity(content.len());
    let mut replaced = 0;

    for instruction in instructions(content) {
        let Some((start, end)) = from_image_span(instruction) else {
            output.push_str(instruction);
            continue;
        };

        let token = &instruction[start..end];
        debug!("Found parent image {}", token);

        let local = ImageRef::parse(token)
            .ok()
            .and_then(|image| known_images.iter().find(|local| image.matches(local)));

        match local {
            Some(local) => {
                let pinned = local.pinned_reference();
                info!("Replacing image {} by {}", token, pinned);
                output.push_str(&instruction[..start]);
                output.push_str(&pinned);
                output.push_str(&instruction[end..]);
                replaced += 1;
            }
            None => output.push_str(instruction),
        }
    }

    (output, replaced)
}

/// 継続行をまとめた命令単位に分割する（改行を含めて元のバイト列を保持）
fn instructions(content: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut end = 0;

    for line in content.split_inclusive('\n') {
        end += line.len();
        if !line.trim_end().ends_with('\\') {
            chunks.push(&content[start..end]);
            start = end;
        }
    }
    if start < content.len() {
        chunks.push(&content[start..]);
    }

    chunks
}

/// `\` と改行による行継続の長さ
fn continuation_len(rest: &str) -> Option<usize> {
    let after = rest.strip_prefix('\\')?;
    let line_end = after.find('\n')?;
    after[..line_end].trim().is_empty().then_some(1 + line_end + 1)
}

/// 空白と行継続を読み飛ばした位置
fn skip_separators(text: &str, mut pos: usize) -> usize {
    loop {
        let rest = &text[pos..];
        pos += rest.len() - rest.trim_start().len();
        match continuation_len(&text[pos..]) {
            Some(len) => pos += len,
            None => return pos,
        }
    }
}

fn token_len(rest: &str) -> usize {
    rest.char_indices()
        .find(|&(i, c)| c.is_whitespace() || continuation_len(&rest[i..]).is_some())
        .map(|(i, _)| i)
        .unwrap_or(rest.len())
}

/// FROM 命令のイメージトークンのバイト範囲を返す
///
/// `FROM [--flag ...] <image> [AS <stage>]`
fn from_image_span(instruction: &str) -> Option<(usize, usize)> {
    let start = skip_separators(instruction, 0);
    let keyword_len = token_len(&instruction[start..]);
    if !instruction[start..start + keyword_len].eq_ignore_ascii_case("FROM") {
        return None;
    }

    let mut pos = start + keyword_len;
    loop {
        pos = skip_separators(instruction, pos);
        let rest = &instruction[pos..];
        let len = token_len(rest);
        if len == 0 {
            return None;
        }
        if rest.starts_with("--") {
            pos += len;
            continue;
        }

        return Some((pos, pos + len));
    }
}
