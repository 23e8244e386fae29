//! Artifact storage: local-first loading of the model and its metadata, with
//! a remote fallback through an injected [`ObjectFetcher`](penguin_sync::ObjectFetcher).

mod config;
mod error;
mod store;

pub use config::{RemoteConfig, RemoteLocation, StoreConfig};
pub use error::StoreError;
pub use store::{ArtifactStore, LoadSource, StoreStatus};
