//! shipflow image build functionality
//!
//! This crate provides the build backends used by shipflow (docker, podman,
//! Docker-in-Docker and img), the skopeo archive pusher, and the
//! docker-compose build driver.

pub mod backend;
mod cli;
pub mod compose;
pub mod context;
pub mod dind;
pub mod docker;
pub mod error;
pub mod img;
pub mod podman;
pub mod skopeo;
pub mod tool;

pub use backend::{
    ArchivePusher, BackendKind, BuildBackend, PushToolKind, create_backend, create_pusher,
};
pub use compose::{BuiltService, ComposeBuilder, ComposeOptions};
pub use dind::DinD;
pub use docker::Docker;
pub use error::{BuildError, BuildResult, Result};
pub use img::Img;
pub use podman::Podman;
pub use skopeo::Skopeo;
pub use tool::Tool;
