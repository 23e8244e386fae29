//! Prediction pipeline: category check → encode → infer → decode.

use std::sync::Arc;

use async_trait::async_trait;
use penguin_core::{EncodedVector, FeatureRecord};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::artifacts::Artifacts;
use crate::labels::InvalidCategory;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Supplies the loaded artifact set to the engine.
///
/// Implementations must load at most once and install the classifier and
/// metadata together, so callers only ever see a complete [`Artifacts`].
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    /// Load the artifacts if needed and return them.
    async fn ensure_loaded(&self) -> Result<Arc<Artifacts>, BoxError>;

    /// The artifacts if a load has already succeeded.
    fn loaded(&self) -> Option<Arc<Artifacts>>;
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model artifacts are not loaded")]
    NotLoaded,

    #[error("failed to load model artifacts: {0}")]
    Load(#[source] BoxError),

    #[error(transparent)]
    InvalidCategory(#[from] InvalidCategory),

    #[error("prediction failed: {0}")]
    Prediction(#[source] BoxError),
}

impl PredictError {
    /// True when the request itself is at fault rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidCategory(_))
    }
}

/// Turns feature records into species names using a shared artifact provider.
pub struct PredictionEngine<P> {
    provider: Arc<P>,
}

impl<P> Clone for PredictionEngine<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: ArtifactProvider> PredictionEngine<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Predict the species for one record, loading artifacts on first use.
    pub async fn predict(&self, record: &FeatureRecord) -> Result<String, PredictError> {
        self.provider.ensure_loaded().await.map_err(|e| {
            error!(error = %e, "artifact load failed");
            PredictError::Load(e)
        })?;
        self.predict_loaded(record)
    }

    /// Predict without triggering a load; fails with [`PredictError::NotLoaded`]
    /// until some earlier call has loaded the artifacts.
    pub fn predict_loaded(&self, record: &FeatureRecord) -> Result<String, PredictError> {
        let artifacts = self.provider.loaded().ok_or_else(|| {
            error!("prediction requested before artifacts were loaded");
            PredictError::NotLoaded
        })?;
        run_pipeline(&artifacts, record)
    }
}

fn run_pipeline(artifacts: &Artifacts, record: &FeatureRecord) -> Result<String, PredictError> {
    if let Err(invalid) = artifacts.metadata.encoder_info.validate(record) {
        warn!(field = invalid.field, value = %invalid.value, "rejected unseen category");
        return Err(invalid.into());
    }

    let vector = EncodedVector::from_record(record);

    let class = artifacts
        .classifier
        .predict(vector.as_slice())
        .map_err(|e| prediction_failed(e.into()))?;
    let species = artifacts
        .metadata
        .label_encoder
        .decode(class)
        .map_err(|e| prediction_failed(e.into()))?;

    debug!(class, species, "prediction complete");
    Ok(species.to_string())
}

fn prediction_failed(cause: BoxError) -> PredictError {
    error!(error = %cause, "prediction failed");
    PredictError::Prediction(cause)
}
