use std::path::PathBuf;

use penguin_ai::ArtifactError;
use penguin_sync::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing remote artifact configuration: set {}", missing.join(", "))]
    MissingRemoteConfig { missing: Vec<&'static str> },

    #[error("failed to prepare artifact directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact load failed: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("artifact download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("artifact load task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}
