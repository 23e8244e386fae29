//! Fixed numeric layout the classifier was trained on.
//!
//! The column order is baked into the trained trees: feature `i` of every
//! split refers to `FEATURE_COLUMNS[i]`. Reordering this list without
//! retraining silently changes every prediction.

use tracing::debug;

use crate::record::FeatureRecord;

/// Number of columns in an [`EncodedVector`].
pub const ENCODED_WIDTH: usize = 9;

/// Column names in model input order.
pub const FEATURE_COLUMNS: [&str; ENCODED_WIDTH] = [
    "bill_length_mm",
    "bill_depth_mm",
    "flipper_length_mm",
    "body_mass_g",
    "sex_Female",
    "sex_Male",
    "island_Biscoe",
    "island_Dream",
    "island_Torgersen",
];

/// Categorical request fields that carry training-time value sets.
pub const CATEGORICAL_FIELDS: [&str; 2] = ["sex", "island"];

const SEX_OFFSET: usize = 4;
const ISLAND_OFFSET: usize = 6;

/// A feature record flattened into the classifier's input layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedVector([f32; ENCODED_WIDTH]);

impl EncodedVector {
    /// Build the fixed-order vector: four measurements, then the `sex_*` and
    /// `island_*` one-hot blocks with a single 1 in each.
    pub fn from_record(record: &FeatureRecord) -> Self {
        let mut values = [0.0f32; ENCODED_WIDTH];
        for (i, (_, value)) in record.measurements().into_iter().enumerate() {
            values[i] = value as f32;
        }
        values[SEX_OFFSET + record.sex.one_hot_index()] = 1.0;
        values[ISLAND_OFFSET + record.island.one_hot_index()] = 1.0;

        debug!(sex = %record.sex, island = %record.island, "encoded input features");
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}
