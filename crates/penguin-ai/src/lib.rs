//! Species inference: XGBoost tree evaluation, training-time metadata and the
//! prediction pipeline that ties them to the feature encoder.

pub mod artifacts;
pub mod classifier;
pub mod engine;
pub mod labels;
mod xgboost;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{ArtifactError, Artifacts};
pub use classifier::{Classifier, ClassifierError, Objective};
pub use engine::{ArtifactProvider, BoxError, PredictError, PredictionEngine};
pub use labels::{EncodingMetadata, InvalidCategory, LabelDecoder, MetadataBundle, MetadataError};
