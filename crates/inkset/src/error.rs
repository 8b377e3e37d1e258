//! CLI error types.

use std::path::PathBuf;

use inkset_config::ConfigError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: invalid front matter: {source}", .path.display())]
    FrontMatter {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("{0}")]
    Build(String),
}
