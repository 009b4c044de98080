//! Runtime for ephemeral browser-based code editors.
//!
//! This crate provides the template table, image verification and rebuild,
//! container launch, the in-memory registry of active editors, launch
//! progress tracking, and the axum router that exposes them over HTTP.

pub mod api;
pub mod engine;
pub mod error;
pub mod image;
pub mod launch_progress;
pub mod launcher;
pub mod registry;
pub mod runtime;
pub mod templates;
pub mod util;

pub use engine::{ContainerEngine, DockerEngine};
pub use error::{EditorError, Result};
pub use launcher::{EditorLauncher, StartEditorResponse};
pub use runtime::EditorRuntimeConfig;

pub const DEFAULT_API_PORT: u16 = 3000;
pub const DEFAULT_CONTAINER_PORT: u16 = 8080;
pub const DEFAULT_PORT_BASE: u16 = 8000;
pub const DEFAULT_PORT_SPAN: u16 = 1000;
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 2000;
pub const DEFAULT_VERIFY_RETRIES: u32 = 3;
pub const DEFAULT_VERIFY_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_LAUNCH_RETENTION_SECS: u64 = 3600;
