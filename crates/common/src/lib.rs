//! GH Users Search common library
//!
//! Data model and configuration shared by the REST contract checks and the
//! browser end-to-end flow.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ArtifactPolicy, BrowserKind, BrowserSettings, ScreenshotMode, SuiteConfig, TraceMode, VideoMode,
};
pub use error::{Error, Result};
pub use types::*;

/// Suite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
