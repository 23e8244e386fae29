//! Request-side feature record and its static schema checks.
//!
//! The closed enums here only prove a category is syntactically legal. Whether
//! the trained model ever saw that category is checked later against the
//! encoding metadata shipped with the model.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than 0, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("invalid request body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Penguin sex as recorded in the training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Male, Sex::Female];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }

    /// Position of this value inside the `sex_*` one-hot block.
    pub(crate) fn one_hot_index(&self) -> usize {
        match self {
            Self::Female => 0,
            Self::Male => 1,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Island where the penguin was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Island {
    Torgersen,
    Biscoe,
    Dream,
}

impl Island {
    pub const ALL: [Island; 3] = [Island::Torgersen, Island::Biscoe, Island::Dream];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Torgersen => "Torgersen",
            Self::Biscoe => "Biscoe",
            Self::Dream => "Dream",
        }
    }

    /// Position of this value inside the `island_*` one-hot block.
    pub(crate) fn one_hot_index(&self) -> usize {
        match self {
            Self::Biscoe => 0,
            Self::Dream => 1,
            Self::Torgersen => 2,
        }
    }
}

impl fmt::Display for Island {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One set of penguin measurements submitted for prediction.
///
/// `year` is accepted for schema compatibility but is not a model input. It
/// takes any whole number, so `2007` and `2007.0` are the same year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub bill_length_mm: f64,
    pub bill_depth_mm: f64,
    pub flipper_length_mm: f64,
    pub body_mass_g: f64,
    #[serde(deserialize_with = "whole_year")]
    pub year: i32,
    pub sex: Sex,
    pub island: Island,
}

fn whole_year<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let n = serde_json::Number::deserialize(deserializer)?;
    let whole = match n.as_i64() {
        Some(i) => Some(i),
        None => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() <= i32::MAX as f64)
            .map(|f| f as i64),
    };
    whole
        .and_then(|i| i32::try_from(i).ok())
        .ok_or_else(|| de::Error::custom(format!("year must be a whole number, got {n}")))
}

impl FeatureRecord {
    /// Parse a record from JSON and apply the static schema checks.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let record: Self = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    /// Check that every measurement is finite and strictly positive.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in self.measurements() {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field, value });
            }
            if value <= 0.0 {
                return Err(ValidationError::NonPositive { field, value });
            }
        }
        Ok(())
    }

    /// The four continuous measurements in model column order.
    pub fn measurements(&self) -> [(&'static str, f64); 4] {
        [
            ("bill_length_mm", self.bill_length_mm),
            ("bill_depth_mm", self.bill_depth_mm),
            ("flipper_length_mm", self.flipper_length_mm),
            ("body_mass_g", self.body_mass_g),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "bill_length_mm": 39.1,
        "bill_depth_mm": 18.7,
        "flipper_length_mm": 181,
        "body_mass_g": 3750,
        "year": 2007,
        "sex": "Female",
        "island": "Biscoe"
    }"#;

    #[test]
    fn parses_valid_record() {
        let record = FeatureRecord::from_json(SAMPLE).unwrap();
        assert_eq!(record.bill_length_mm, 39.1);
        assert_eq!(record.flipper_length_mm, 181.0);
        assert_eq!(record.year, 2007);
        assert_eq!(record.sex, Sex::Female);
        assert_eq!(record.island, Island::Biscoe);
    }

    #[test]
    fn rejects_negative_body_mass() {
        let json = SAMPLE.replace("3750", "-50");
        let err = FeatureRecord::from_json(&json).unwrap_err();
        match err {
            ValidationError::NonPositive { field, value } => {
                assert_eq!(field, "body_mass_g");
                assert_eq!(value, -50.0);
            }
            other => panic!("expected NonPositive, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_measurement() {
        let json = SAMPLE.replace("18.7", "0");
        assert!(matches!(
            FeatureRecord::from_json(&json),
            Err(ValidationError::NonPositive {
                field: "bill_depth_mm",
                ..
            })
        ));
    }

    #[test]
    fn rejects_unknown_sex() {
        let json = SAMPLE.replace("\"Female\"", "\"Other\"");
        assert!(matches!(
            FeatureRecord::from_json(&json),
            Err(ValidationError::Json(_))
        ));
    }

    #[test]
    fn rejects_missing_field() {
        let json = SAMPLE.replace("\"bill_length_mm\": 39.1,", "");
        let err = FeatureRecord::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("bill_length_mm"), "{err}");
    }

    #[test]
    fn rejects_wrong_type() {
        let json = SAMPLE.replace("39.1", "\"not-a-number\"");
        assert!(matches!(
            FeatureRecord::from_json(&json),
            Err(ValidationError::Json(_))
        ));
    }

    #[test]
    fn rejects_empty_object() {
        assert!(FeatureRecord::from_json("{}").is_err());
    }

    #[test]
    fn non_finite_is_rejected() {
        let mut record = FeatureRecord::from_json(SAMPLE).unwrap();
        record.flipper_length_mm = f64::NAN;
        assert!(matches!(
            record.validate(),
            Err(ValidationError::NonFinite {
                field: "flipper_length_mm",
                ..
            })
        ));
    }

    #[test]
    fn whole_float_year_is_accepted() {
        let json = SAMPLE.replace("2007", "2007.0");
        assert_eq!(FeatureRecord::from_json(&json).unwrap().year, 2007);
    }

    #[test]
    fn fractional_year_is_rejected() {
        let json = SAMPLE.replace("2007", "2007.5");
        let err = FeatureRecord::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("whole number"), "{err}");

        let json = SAMPLE.replace("2007", "1e12");
        assert!(FeatureRecord::from_json(&json).is_err());
        let json = SAMPLE.replace("2007", "\"2007\"");
        assert!(FeatureRecord::from_json(&json).is_err());
    }

    #[test]
    fn enum_names_match_wire_format() {
        for sex in Sex::ALL {
            let json = serde_json::to_string(&sex).unwrap();
            assert_eq!(json, format!("\"{}\"", sex.as_str()));
        }
        for island in Island::ALL {
            let json = serde_json::to_string(&island).unwrap();
            assert_eq!(json, format!("\"{island}\""));
        }
    }
}
