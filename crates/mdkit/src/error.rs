//! CLI error types.

use std::path::PathBuf;

use mdkit_config::ConfigError;
use mdkit_plugin::UnknownPluginError;
use mdkit_renderer::BackendError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("Source file not available: {}", .0.display())]
    SourceUnavailable(PathBuf),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    UnknownPlugin(#[from] UnknownPluginError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
