//! Core types shared across the prediction service: the request record, its
//! static schema, and the classifier's fixed input layout.

pub mod record;
pub mod schema;

pub use record::{FeatureRecord, Island, Sex, ValidationError};
pub use schema::{CATEGORICAL_FIELDS, ENCODED_WIDTH, EncodedVector, FEATURE_COLUMNS};
