//! Training-time encoding metadata shipped alongside the model.
//!
//! One bundle file carries both the categorical values seen during training
//! (`encoder_info`) and the class-index → species decoder (`label_encoder`).
//! They are parsed together and only ever installed together.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use penguin_core::{FeatureRecord, Island, Sex};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read metadata bundle {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metadata bundle: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no valid values listed for categorical field '{0}'")]
    EmptyCategory(&'static str),

    #[error("class index {index} is outside the label decoder's {len} classes")]
    UnknownClass { index: usize, len: usize },
}

/// A categorical value that is a legal enum member but was never seen in training.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {value}. Must be one of {allowed:?}")]
pub struct InvalidCategory {
    pub field: &'static str,
    pub value: String,
    pub allowed: Vec<String>,
}

/// Categorical values observed at training time, in the order the bundle lists them.
#[derive(Debug, Clone, Deserialize)]
pub struct EncodingMetadata {
    sex: Vec<Sex>,
    island: Vec<Island>,
}

impl EncodingMetadata {
    pub fn new(sex: Vec<Sex>, island: Vec<Island>) -> Self {
        Self { sex, island }
    }

    /// Check the record's categorical fields against the training-time sets.
    pub fn validate(&self, record: &FeatureRecord) -> Result<(), InvalidCategory> {
        if !self.sex.contains(&record.sex) {
            return Err(InvalidCategory {
                field: "sex",
                value: record.sex.to_string(),
                allowed: self.sex.iter().map(|s| s.to_string()).collect(),
            });
        }
        if !self.island.contains(&record.island) {
            return Err(InvalidCategory {
                field: "island",
                value: record.island.to_string(),
                allowed: self.island.iter().map(|i| i.to_string()).collect(),
            });
        }
        Ok(())
    }

    pub fn sex_values(&self) -> &[Sex] {
        &self.sex
    }

    pub fn island_values(&self) -> &[Island] {
        &self.island
    }

    fn check_non_empty(&self) -> Result<(), MetadataError> {
        if self.sex.is_empty() {
            return Err(MetadataError::EmptyCategory("sex"));
        }
        if self.island.is_empty() {
            return Err(MetadataError::EmptyCategory("island"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct LabelEncoderRepr {
    classes: Vec<String>,
}

/// Bidirectional mapping between class indices and species names.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "LabelEncoderRepr")]
pub struct LabelDecoder {
    classes: Vec<String>,
}

impl TryFrom<LabelEncoderRepr> for LabelDecoder {
    type Error = String;

    fn try_from(repr: LabelEncoderRepr) -> Result<Self, Self::Error> {
        Self::new(repr.classes)
    }
}

impl LabelDecoder {
    /// Build a decoder where `classes[i]` names class index `i`.
    pub fn new(classes: Vec<String>) -> Result<Self, String> {
        if classes.is_empty() {
            return Err("label encoder has no classes".to_string());
        }
        let mut seen = HashSet::with_capacity(classes.len());
        for name in &classes {
            if !seen.insert(name.as_str()) {
                return Err(format!("duplicate class label '{name}'"));
            }
        }
        Ok(Self { classes })
    }

    /// Species name for a class index.
    pub fn decode(&self, class: usize) -> Result<&str, MetadataError> {
        self.classes
            .get(class)
            .map(String::as_str)
            .ok_or(MetadataError::UnknownClass {
                index: class,
                len: self.classes.len(),
            })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// The metadata artifact: validity map and label decoder as one unit.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataBundle {
    pub encoder_info: EncodingMetadata,
    pub label_encoder: LabelDecoder,
}

impl MetadataBundle {
    /// Load the bundle from its JSON file.
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let bytes = std::fs::read(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let bundle: Self = serde_json::from_slice(&bytes)?;
        bundle.encoder_info.check_non_empty()?;
        info!(
            path = %path.display(),
            classes = bundle.label_encoder.len(),
            "loaded encoding metadata"
        );
        Ok(bundle)
    }

    /// Parse the bundle from JSON text.
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        let bundle: Self = serde_json::from_str(json)?;
        bundle.encoder_info.check_non_empty()?;
        Ok(bundle)
    }
}
