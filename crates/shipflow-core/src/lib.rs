//! shipflow-core
//!
//! コンテナイメージのビルドと配布で共有するプリミティブ。
//! イメージ名、ビルドタグ、保存済みアーカイブのマニフェスト、
//! Dockerfile のローカライズ、リトライ、compose ファイルのモデルを提供します。

pub mod compose;
pub mod dockerfile;
pub mod error;
pub mod image;
pub mod manifest;
pub mod retry;
pub mod tags;

pub use compose::{BuildArgs, BuildOptions, BuildSpec, ComposeBuild, ComposeFile, ComposeService};
pub use dockerfile::{localize, localize_content};
pub use error::{CoreError, Result};
pub use image::{DEFAULT_TAG, ImageRef, LocalImage, split_image_tag};
pub use manifest::{ManifestEntry, ManifestStore, is_tar_archive};
pub use retry::RetryPolicy;
pub use tags::{BuildTag, generate_tags};
