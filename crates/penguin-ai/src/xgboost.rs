//! XGBoost JSON model schema.
//!
//! Foreign types used only for parsing `model.json` as written by
//! `XGBClassifier.save_model`. Fields the predictor never reads are left out
//! and ignored by serde.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};

/// Accept `0.5`, `"5E-1"`, `"[5E-1,5E-1]"` or `[0.5]` and normalize to a list.
///
/// XGBoost 2.x writes a stringified scalar; 3.x may write a stringified array
/// with one intercept per output group.
fn deserialize_base_score<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    fn scalar<E: SerdeError>(v: &Value) -> Result<f32, E> {
        match v {
            Value::Number(n) => n
                .as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| E::custom("invalid base_score number")),
            Value::String(s) => s
                .trim()
                .parse::<f32>()
                .map_err(|_| E::custom(format!("cannot parse base_score: {s}"))),
            _ => Err(E::custom("base_score entries must be numbers")),
        }
    }

    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Array(arr) => arr,
        Value::String(s) if s.trim().starts_with('[') => {
            serde_json::from_str::<Vec<Value>>(s.trim()).map_err(D::Error::custom)?
        }
        other => vec![other],
    };
    if items.is_empty() {
        return Err(D::Error::custom("empty base_score"));
    }
    items.iter().map(scalar::<D::Error>).collect()
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct TreeParam {
    #[serde_as(as = "DisplayFromStr")]
    pub num_nodes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub tree_param: TreeParam,
    pub left_children: Vec<i32>,
    pub right_children: Vec<i32>,
    pub split_indices: Vec<i32>,
    pub split_conditions: Vec<f32>,
    pub default_left: Vec<i32>,
    #[serde(default)]
    pub split_type: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTrees {
    pub trees: Vec<Tree>,
    pub tree_info: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GbTreeDefinition {
    pub model: ModelTrees,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum GradientBooster {
    Gbtree {
        model: ModelTrees,
    },
    Dart {
        gbtree: GbTreeDefinition,
        weight_drop: Vec<f32>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Objective {
    pub name: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct LearnerModelParam {
    #[serde(deserialize_with = "deserialize_base_score")]
    pub base_score: Vec<f32>,
    #[serde_as(as = "DisplayFromStr")]
    pub num_class: i64,
    #[serde_as(as = "DisplayFromStr")]
    pub num_feature: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Learner {
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub gradient_booster: GradientBooster,
    pub objective: Objective,
    pub learner_model_param: LearnerModelParam,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XgbModel {
    pub learner: Learner,
}
