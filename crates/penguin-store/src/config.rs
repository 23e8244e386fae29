use std::path::PathBuf;

/// Where the remote copies of the artifacts live. Every field is required
/// before a remote load is attempted.
#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    pub bucket: Option<String>,
    pub model_object: Option<String>,
    pub encoder_object: Option<String>,
}

/// Fully resolved remote location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub bucket: String,
    pub model_object: String,
    pub encoder_object: String,
}

impl RemoteConfig {
    /// Resolve all three parameters, or name every one that is absent.
    pub fn resolve(&self) -> Result<RemoteLocation, Vec<&'static str>> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        let bucket = present(&self.bucket);
        let model = present(&self.model_object);
        let encoder = present(&self.encoder_object);
        match (bucket, model, encoder) {
            (Some(bucket), Some(model), Some(encoder)) => Ok(RemoteLocation {
                bucket: bucket.to_string(),
                model_object: model.to_string(),
                encoder_object: encoder.to_string(),
            }),
            _ => {
                let missing = [
                    ("GCS_BUCKET_NAME", bucket),
                    ("GCS_MODEL_BLOB_NAME", model),
                    ("GCS_ENCODER_BLOB_NAME", encoder),
                ]
                .into_iter()
                .filter(|(_, v)| v.is_none())
                .map(|(name, _)| name)
                .collect();
                Err(missing)
            }
        }
    }
}

/// Local artifact layout plus the source-selection policy.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub model_dir: PathBuf,
    pub model_file: String,
    pub encoder_file: String,
    /// Skip the local copies even when both exist.
    pub force_remote: bool,
    pub remote: RemoteConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("data"),
            model_file: "model.json".to_string(),
            encoder_file: "encoder_info.json".to_string(),
            force_remote: false,
            remote: RemoteConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    pub fn encoder_path(&self) -> PathBuf {
        self.model_dir.join(&self.encoder_file)
    }
}
