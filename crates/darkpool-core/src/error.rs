use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the analysis stages.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(
        "collection results not found at '{}'. Run `darkpool collect` first",
        path.display()
    )]
    MissingCollection { path: PathBuf },

    #[error("failed to read collection results at '{}'", path.display())]
    ReadCollection {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("collection results at '{}' are malformed", path.display())]
    MalformedCollection {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
