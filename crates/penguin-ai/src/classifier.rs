//! Gradient-boosted tree classifier loaded from an XGBoost JSON model.
//!
//! The forest is converted once at load time into a compact node array per
//! tree. Prediction sums leaf values per output group, then takes the argmax
//! (multi-class) or the sign of the margin (binary).

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::xgboost::{GradientBooster, ModelTrees, Tree as XgbTree, XgbModel};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported objective: {0}")]
    UnsupportedObjective(String),

    #[error("tree {0} has no nodes")]
    EmptyTree(usize),

    #[error("tree {tree} is malformed: {reason}")]
    MalformedTree { tree: usize, reason: String },

    #[error(
        "invalid node index in tree {tree}: node {node} references child {child} but tree has {num_nodes} nodes"
    )]
    InvalidNodeIndex {
        tree: usize,
        node: usize,
        child: i32,
        num_nodes: usize,
    },

    #[error("tree {tree} node {node} splits on feature {feature} but the model has {num_features} features")]
    InvalidFeatureIndex {
        tree: usize,
        node: usize,
        feature: i32,
        num_features: usize,
    },

    #[error("tree {tree} node {node} uses a categorical split, only numeric splits are supported")]
    CategoricalSplit { tree: usize, node: usize },

    #[error("tree {tree} is assigned to group {group} but the model has {num_groups} groups")]
    InvalidGroup {
        tree: usize,
        group: i32,
        num_groups: usize,
    },

    #[error("dart booster has {weights} tree weights for {trees} trees")]
    DartWeights { weights: usize, trees: usize },

    #[error("expected {expected} input features, got {actual}")]
    InputWidth { expected: usize, actual: usize },
}

/// How per-group margins become a class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// `multi:softprob` / `multi:softmax`: argmax over group margins.
    Multiclass,
    /// `binary:logistic`: base score is a probability, converted to a logit.
    BinaryLogistic,
    /// `binary:logitraw`: base score is already a margin.
    BinaryLogitRaw,
}

impl Objective {
    fn parse(name: &str) -> Result<Self, ClassifierError> {
        match name {
            "multi:softprob" | "multi:softmax" => Ok(Self::Multiclass),
            "binary:logistic" => Ok(Self::BinaryLogistic),
            "binary:logitraw" => Ok(Self::BinaryLogitRaw),
            other => Err(ClassifierError::UnsupportedObjective(other.to_string())),
        }
    }

    /// Map a stored base score to margin space.
    fn to_margin(self, base_score: f32) -> f32 {
        match self {
            Self::BinaryLogistic => {
                let p = base_score.clamp(1e-7, 1.0 - 1e-7);
                (p / (1.0 - p)).ln()
            }
            Self::Multiclass | Self::BinaryLogitRaw => base_score,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: u32,
        threshold: f32,
        default_left: bool,
        left: u32,
        right: u32,
    },
    Leaf(f32),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Box<[Node]>,
}

impl Tree {
    /// Walk from the root to a leaf. Missing values (NaN) follow `default_left`.
    fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut idx = 0usize;
        loop {
            match self.nodes[idx] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                } => {
                    let x = features[feature as usize];
                    let go_left = if x.is_nan() { default_left } else { x < threshold };
                    idx = (if go_left { left } else { right }) as usize;
                }
            }
        }
    }
}

/// A trained tree ensemble mapping a feature vector to a class index.
#[derive(Debug, Clone)]
pub struct Classifier {
    trees: Vec<Tree>,
    tree_groups: Vec<usize>,
    tree_weights: Option<Vec<f32>>,
    base_margin: Vec<f32>,
    objective: Objective,
    num_features: usize,
    feature_names: Vec<String>,
}

impl Classifier {
    /// Load a classifier from an XGBoost JSON model file.
    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        let bytes = std::fs::read(path).map_err(|source| ClassifierError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: XgbModel = serde_json::from_slice(&bytes)?;
        let classifier = Self::from_xgboost(model)?;
        info!(
            path = %path.display(),
            trees = classifier.trees.len(),
            classes = classifier.num_classes(),
            "loaded classifier"
        );
        Ok(classifier)
    }

    /// Parse a classifier from XGBoost JSON text.
    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let model: XgbModel = serde_json::from_str(json)?;
        Self::from_xgboost(model)
    }

    fn from_xgboost(model: XgbModel) -> Result<Self, ClassifierError> {
        let learner = model.learner;
        let objective = Objective::parse(&learner.objective.name)?;
        let param = learner.learner_model_param;
        let num_features = param.num_feature.max(0) as usize;

        let num_groups = match objective {
            Objective::Multiclass => param.num_class.max(1) as usize,
            Objective::BinaryLogistic | Objective::BinaryLogitRaw => 1,
        };

        let (model_trees, tree_weights): (ModelTrees, Option<Vec<f32>>) =
            match learner.gradient_booster {
                GradientBooster::Gbtree { model } => (model, None),
                GradientBooster::Dart {
                    gbtree,
                    weight_drop,
                } => (gbtree.model, Some(weight_drop)),
            };

        if let Some(weights) = &tree_weights
            && weights.len() != model_trees.trees.len()
        {
            return Err(ClassifierError::DartWeights {
                weights: weights.len(),
                trees: model_trees.trees.len(),
            });
        }

        let mut trees = Vec::with_capacity(model_trees.trees.len());
        let mut tree_groups = Vec::with_capacity(model_trees.trees.len());
        for (tree_idx, xgb_tree) in model_trees.trees.iter().enumerate() {
            let group = model_trees.tree_info.get(tree_idx).copied().unwrap_or(0);
            if group < 0 || group as usize >= num_groups {
                return Err(ClassifierError::InvalidGroup {
                    tree: tree_idx,
                    group,
                    num_groups,
                });
            }
            trees.push(convert_tree(xgb_tree, tree_idx, num_features)?);
            tree_groups.push(group as usize);
        }

        let base_margin = (0..num_groups)
            .map(|g| {
                let raw = param
                    .base_score
                    .get(g)
                    .or_else(|| param.base_score.first())
                    .copied()
                    .unwrap_or(0.5);
                objective.to_margin(raw)
            })
            .collect();

        Ok(Self {
            trees,
            tree_groups,
            tree_weights,
            base_margin,
            objective,
            num_features,
            feature_names: learner.feature_names,
        })
    }

    /// Raw per-group margins for one feature vector.
    pub fn margins(&self, features: &[f32]) -> Result<Vec<f32>, ClassifierError> {
        if features.len() != self.num_features {
            return Err(ClassifierError::InputWidth {
                expected: self.num_features,
                actual: features.len(),
            });
        }

        let mut margins = self.base_margin.clone();
        for (i, tree) in self.trees.iter().enumerate() {
            let weight = self.tree_weights.as_ref().map_or(1.0, |w| w[i]);
            margins[self.tree_groups[i]] += weight * tree.leaf_value(features);
        }
        Ok(margins)
    }

    /// Predicted class index for one feature vector.
    pub fn predict(&self, features: &[f32]) -> Result<usize, ClassifierError> {
        let margins = self.margins(features)?;
        let class = match self.objective {
            Objective::Multiclass => argmax(&margins),
            Objective::BinaryLogistic | Objective::BinaryLogitRaw => usize::from(margins[0] > 0.0),
        };
        Ok(class)
    }

    /// Number of distinct class indices [`predict`](Self::predict) can return.
    pub fn num_classes(&self) -> usize {
        match self.objective {
            Objective::Multiclass => self.base_margin.len(),
            Objective::BinaryLogistic | Objective::BinaryLogitRaw => 2,
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Feature names recorded in the model, empty when trained without them.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }
}

/// First index of the largest value; ties resolve to the lower class.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Convert one XGBoost tree, validating every index the traversal will use.
fn convert_tree(
    xgb_tree: &XgbTree,
    tree_idx: usize,
    num_features: usize,
) -> Result<Tree, ClassifierError> {
    let num_nodes = xgb_tree.tree_param.num_nodes.max(0) as usize;
    if num_nodes == 0 {
        return Err(ClassifierError::EmptyTree(tree_idx));
    }

    let lengths = [
        ("left_children", xgb_tree.left_children.len()),
        ("right_children", xgb_tree.right_children.len()),
        ("split_indices", xgb_tree.split_indices.len()),
        ("split_conditions", xgb_tree.split_conditions.len()),
        ("default_left", xgb_tree.default_left.len()),
    ];
    for (name, len) in lengths {
        if len != num_nodes {
            return Err(ClassifierError::MalformedTree {
                tree: tree_idx,
                reason: format!("{name} has {len} entries for {num_nodes} nodes"),
            });
        }
    }

    let mut nodes = Vec::with_capacity(num_nodes);
    for node_idx in 0..num_nodes {
        let left = xgb_tree.left_children[node_idx];
        let right = xgb_tree.right_children[node_idx];

        // XGBoost marks leaves with left child -1; the leaf value lives in split_conditions.
        if left == -1 {
            nodes.push(Node::Leaf(xgb_tree.split_conditions[node_idx]));
            continue;
        }

        if xgb_tree.split_type.get(node_idx).copied().unwrap_or(0) != 0 {
            return Err(ClassifierError::CategoricalSplit {
                tree: tree_idx,
                node: node_idx,
            });
        }

        // Children are always allocated after their parent, which also rules out cycles.
        for child in [left, right] {
            if child <= node_idx as i32 || child as usize >= num_nodes {
                return Err(ClassifierError::InvalidNodeIndex {
                    tree: tree_idx,
                    node: node_idx,
                    child,
                    num_nodes,
                });
            }
        }

        let feature = xgb_tree.split_indices[node_idx];
        if feature < 0 || feature as usize >= num_features {
            return Err(ClassifierError::InvalidFeatureIndex {
                tree: tree_idx,
                node: node_idx,
                feature,
                num_features,
            });
        }

        nodes.push(Node::Split {
            feature: feature as u32,
            threshold: xgb_tree.split_conditions[node_idx],
            default_left: xgb_tree.default_left[node_idx] != 0,
            left: left as u32,
            right: right as u32,
        });
    }

    Ok(Tree {
        nodes: nodes.into_boxed_slice(),
    })
}
