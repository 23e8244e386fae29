//! Process-wide artifact cache with local-first source selection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use penguin_ai::{ArtifactProvider, Artifacts, BoxError};
use penguin_sync::ObjectFetcher;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::StoreError;
use crate::config::StoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Local,
    Remote,
}

impl LoadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot reported by [`ArtifactStore::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub loaded: bool,
    pub source: Option<LoadSource>,
    pub loaded_at: Option<DateTime<Utc>>,
}

struct Loaded {
    artifacts: Arc<Artifacts>,
    source: LoadSource,
    loaded_at: DateTime<Utc>,
}

/// Loads the classifier and metadata bundle at most once per process.
///
/// Concurrent first callers share a single in-flight load. A failed load
/// leaves the store empty so the next call tries again.
pub struct ArtifactStore {
    config: StoreConfig,
    fetcher: Arc<dyn ObjectFetcher>,
    cell: OnceCell<Loaded>,
}

impl ArtifactStore {
    pub fn new(config: StoreConfig, fetcher: Arc<dyn ObjectFetcher>) -> Self {
        Self {
            config,
            fetcher,
            cell: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Load the artifacts if they are not already in memory.
    pub async fn ensure_loaded(&self) -> Result<Arc<Artifacts>, StoreError> {
        let loaded = self
            .cell
            .get_or_try_init(|| async {
                let result = self.load().await;
                if let Err(e) = &result {
                    error!(error = %e, "failed to load model artifacts");
                }
                result
            })
            .await?;
        Ok(Arc::clone(&loaded.artifacts))
    }

    /// The in-memory artifacts, if a load has succeeded.
    pub fn artifacts(&self) -> Option<Arc<Artifacts>> {
        self.cell.get().map(|l| Arc::clone(&l.artifacts))
    }

    pub fn status(&self) -> StoreStatus {
        match self.cell.get() {
            Some(l) => StoreStatus {
                loaded: true,
                source: Some(l.source),
                loaded_at: Some(l.loaded_at),
            },
            None => StoreStatus {
                loaded: false,
                source: None,
                loaded_at: None,
            },
        }
    }

    async fn load(&self) -> Result<Loaded, StoreError> {
        let model_path = self.config.model_path();
        let encoder_path = self.config.encoder_path();

        let (artifacts, source) =
            if !self.config.force_remote && model_path.exists() && encoder_path.exists() {
                info!(model = %model_path.display(), "loading local model artifacts");
                let artifacts = read_artifacts(model_path, encoder_path).await?;
                (artifacts, LoadSource::Local)
            } else {
                info!(
                    force_remote = self.config.force_remote,
                    "loading model artifacts from remote storage"
                );
                let artifacts = self.refresh(&model_path, &encoder_path).await?;
                (artifacts, LoadSource::Remote)
            };

        info!(
            source = %source,
            classes = artifacts.classifier.num_classes(),
            "model artifacts loaded"
        );
        Ok(Loaded {
            artifacts: Arc::new(artifacts),
            source,
            loaded_at: Utc::now(),
        })
    }

    /// Download both objects into a staging directory next to the live files,
    /// parse them there, and only then move them into place. A failed download
    /// or an unreadable object leaves the existing local pair untouched.
    async fn refresh(&self, model_path: &Path, encoder_path: &Path) -> Result<Artifacts, StoreError> {
        let location = self
            .config
            .remote
            .resolve()
            .map_err(|missing| StoreError::MissingRemoteConfig { missing })?;

        let dir = &self.config.model_dir;
        let io_err = |source: std::io::Error| StoreError::Io {
            path: dir.clone(),
            source,
        };
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(dir)
            .map_err(io_err)?;

        let staged_model = staging.path().join(&self.config.model_file);
        let staged_encoder = staging.path().join(&self.config.encoder_file);
        self.fetcher
            .fetch(&location.bucket, &location.model_object, &staged_model)
            .await?;
        self.fetcher
            .fetch(&location.bucket, &location.encoder_object, &staged_encoder)
            .await?;

        let artifacts = read_artifacts(staged_model.clone(), staged_encoder.clone()).await?;

        for (staged, live) in [(&staged_model, model_path), (&staged_encoder, encoder_path)] {
            tokio::fs::rename(staged, live)
                .await
                .map_err(|source| StoreError::Io {
                    path: live.to_path_buf(),
                    source,
                })?;
        }
        debug!(dir = %dir.display(), "installed downloaded artifacts");
        Ok(artifacts)
    }
}

/// Parse both files off the async runtime.
async fn read_artifacts(model: PathBuf, encoder: PathBuf) -> Result<Artifacts, StoreError> {
    let artifacts =
        tokio::task::spawn_blocking(move || Artifacts::from_files(&model, &encoder)).await??;
    Ok(artifacts)
}

#[async_trait]
impl ArtifactProvider for ArtifactStore {
    async fn ensure_loaded(&self) -> Result<Arc<Artifacts>, BoxError> {
        Ok(ArtifactStore::ensure_loaded(self).await?)
    }

    fn loaded(&self) -> Option<Arc<Artifacts>> {
        self.artifacts()
    }
}
