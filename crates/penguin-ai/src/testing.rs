//! Shared fixtures for unit tests.

use std::path::PathBuf;

use penguin_core::{FeatureRecord, Island, Sex};

use crate::artifacts::Artifacts;

pub(crate) fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures")
        .join(name)
}

pub(crate) fn fixture_artifacts() -> Artifacts {
    Artifacts::from_files(&fixture_path("model.json"), &fixture_path("encoder_info.json")).unwrap()
}

/// First row of the Palmer penguins dataset.
pub(crate) fn sample_record() -> FeatureRecord {
    FeatureRecord {
        bill_length_mm: 39.1,
        bill_depth_mm: 18.7,
        flipper_length_mm: 181.0,
        body_mass_g: 3750.0,
        year: 2007,
        sex: Sex::Female,
        island: Island::Biscoe,
    }
}
