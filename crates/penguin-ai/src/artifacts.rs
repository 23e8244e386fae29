//! The loaded artifact set: classifier plus metadata bundle.

use std::path::Path;

use penguin_core::{ENCODED_WIDTH, FEATURE_COLUMNS};
use thiserror::Error;

use crate::classifier::{Classifier, ClassifierError};
use crate::labels::{MetadataBundle, MetadataError};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("model expects {actual} features, the encoder produces {expected}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("model feature names {actual:?} do not match the encoded column order")]
    FeatureOrder { actual: Vec<String> },

    #[error("model predicts {model} classes but the label decoder has {decoder}")]
    ClassCount { model: usize, decoder: usize },
}

/// Classifier and metadata bundle, checked against each other and against
/// the encoder's column layout.
#[derive(Debug)]
pub struct Artifacts {
    pub classifier: Classifier,
    pub metadata: MetadataBundle,
}

impl Artifacts {
    /// Pair a classifier with its metadata, rejecting mismatched artifacts.
    pub fn new(classifier: Classifier, metadata: MetadataBundle) -> Result<Self, ArtifactError> {
        if classifier.num_features() != ENCODED_WIDTH {
            return Err(ArtifactError::FeatureCount {
                expected: ENCODED_WIDTH,
                actual: classifier.num_features(),
            });
        }

        let names = classifier.feature_names();
        if !names.is_empty() && names.iter().map(String::as_str).ne(FEATURE_COLUMNS) {
            return Err(ArtifactError::FeatureOrder {
                actual: names.to_vec(),
            });
        }

        let decoder = metadata.label_encoder.len();
        if classifier.num_classes() != decoder {
            return Err(ArtifactError::ClassCount {
                model: classifier.num_classes(),
                decoder,
            });
        }

        Ok(Self {
            classifier,
            metadata,
        })
    }

    /// Deserialize both artifacts from disk.
    pub fn from_files(model_path: &Path, bundle_path: &Path) -> Result<Self, ArtifactError> {
        let classifier = Classifier::from_file(model_path)?;
        let metadata = MetadataBundle::from_file(bundle_path)?;
        Self::new(classifier, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testing::fixture_path;

    fn fixture_model() -> Classifier {
        Classifier::from_file(&fixture_path("model.json")).unwrap()
    }

    fn fixture_bundle() -> MetadataBundle {
        MetadataBundle::from_file(&fixture_path("encoder_info.json")).unwrap()
    }

    fn fixture_model_json() -> serde_json::Value {
        let text = std::fs::read_to_string(fixture_path("model.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn fixture_pair_is_compatible() {
        let a = Artifacts::from_files(
            &fixture_path("model.json"),
            &fixture_path("encoder_info.json"),
        )
        .unwrap();
        assert_eq!(a.classifier.num_classes(), a.metadata.label_encoder.len());
    }

    #[test]
    fn rejects_class_count_mismatch() {
        let metadata = MetadataBundle::from_json(
            &json!({
                "encoder_info": {"sex": ["Male"], "island": ["Dream"]},
                "label_encoder": {"classes": ["Adelie", "Gentoo"]}
            })
            .to_string(),
        )
        .unwrap();
        assert!(matches!(
            Artifacts::new(fixture_model(), metadata),
            Err(ArtifactError::ClassCount {
                model: 3,
                decoder: 2
            })
        ));
    }

    #[test]
    fn rejects_reordered_feature_names() {
        let mut model = fixture_model_json();
        let names = model["learner"]["feature_names"].as_array_mut().unwrap();
        names.swap(4, 5);
        let clf = Classifier::from_json(&model.to_string()).unwrap();

        let err = Artifacts::new(clf, fixture_bundle()).unwrap_err();
        assert!(matches!(err, ArtifactError::FeatureOrder { .. }));
    }

    #[test]
    fn accepts_model_without_feature_names() {
        let mut model = fixture_model_json();
        model["learner"]["feature_names"] = json!([]);
        let clf = Classifier::from_json(&model.to_string()).unwrap();
        assert!(Artifacts::new(clf, fixture_bundle()).is_ok());
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let mut model = fixture_model_json();
        model["learner"]["learner_model_param"]["num_feature"] = json!("12");
        model["learner"]["feature_names"] = json!([]);
        let clf = Classifier::from_json(&model.to_string()).unwrap();
        assert!(matches!(
            Artifacts::new(clf, fixture_bundle()),
            Err(ArtifactError::FeatureCount { actual: 12, .. })
        ));
    }

    #[test]
    fn missing_bundle_file_fails() {
        let err = Artifacts::from_files(
            &fixture_path("model.json"),
            &fixture_path("does_not_exist.json"),
        )
        .unwrap_err();
        assert!(matches!(err, ArtifactError::Metadata(MetadataError::Io { .. })));
    }
}
