use std::{fs, path::Path, sync::Arc};

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    assembler::FeatureRecord,
    error::{PipelineError, PipelineResult},
};

/// Opaque classifier mapping a fixed-order feature vector to a class code.
pub trait Predictor: Send + Sync {
    /// Predicts the class code for one record.
    fn predict(&self, record: &FeatureRecord) -> PipelineResult<i64>;

    /// Number of features the predictor was trained on.
    fn n_features(&self) -> usize;

    /// Number of classes the predictor can emit, when known.
    fn n_classes(&self) -> Option<usize> {
        None
    }

    /// Trained column order, when the artifact records it.
    fn feature_names(&self) -> Option<&[String]> {
        None
    }
}

/// Serialized classifier artifact, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelArtifact {
    /// Majority-vote ensemble of decision trees.
    Forest(ForestClassifier),
    /// Multinomial linear classifier.
    Linear(LinearClassifier),
}

impl ModelArtifact {
    /// Checks structural consistency and hands out the predictor.
    pub fn into_predictor(self) -> Result<Arc<dyn Predictor>> {
        match self {
            Self::Forest(forest) => {
                forest.validate()?;
                Ok(Arc::new(forest))
            }
            Self::Linear(linear) => {
                linear.validate()?;
                Ok(Arc::new(linear))
            }
        }
    }
}

/// Loads a model artifact; any IO, parse or structural failure is [`PipelineError::ModelUnavailable`].
pub fn load_model(path: impl AsRef<Path>) -> PipelineResult<Arc<dyn Predictor>> {
    let path = path.as_ref();
    read_model(path).map_err(|err| PipelineError::unavailable(path.display().to_string(), &err))
}

fn read_model(path: &Path) -> Result<Arc<dyn Predictor>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading model artifact {}", path.display()))?;
    let artifact: ModelArtifact = serde_json::from_str(&raw)
        .with_context(|| format!("parsing model artifact {}", path.display()))?;
    artifact
        .into_predictor()
        .with_context(|| format!("validating model artifact {}", path.display()))
}

fn check_input(record: &FeatureRecord, n_features: usize) -> PipelineResult<()> {
    if record.len() != n_features {
        return Err(PipelineError::PredictionFailed(format!(
            "expected {n_features} features, got {}",
            record.len()
        )));
    }
    if let Some(idx) = record.values().iter().position(|value| !value.is_finite()) {
        return Err(PipelineError::PredictionFailed(format!(
            "feature {} is not finite",
            record.columns()[idx]
        )));
    }
    Ok(())
}

/// Index of the highest score; the lowest index wins ties.
fn argmax<I: IntoIterator<Item = f64>>(scores: I) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, score) in scores.into_iter().enumerate() {
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((idx, score));
        }
    }
    best.map(|(idx, _)| idx)
}

fn as_code(idx: usize) -> PipelineResult<i64> {
    i64::try_from(idx).map_err(|_| PipelineError::PredictionFailed(format!("class {idx} overflows")))
}

/// One node of a decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// Terminal node voting for a class.
    Leaf {
        /// Class code.
        leaf: u32,
    },
    /// Internal node; values below `threshold` go left.
    Split {
        /// Feature index.
        feature: usize,
        /// Split threshold.
        threshold: f64,
        /// Node index taken when the value is below the threshold.
        left: usize,
        /// Node index taken otherwise.
        right: usize,
    },
}

/// Decision tree stored as a flat node array rooted at index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Nodes; children always point forward.
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self, n_features: usize, n_classes: usize) -> Result<()> {
        ensure!(!self.nodes.is_empty(), "tree has no nodes");
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { leaf } => {
                    ensure!(
                        (*leaf as usize) < n_classes,
                        "node {idx}: leaf class {leaf} outside 0..{n_classes}"
                    );
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    ensure!(
                        *feature < n_features,
                        "node {idx}: feature {feature} outside 0..{n_features}"
                    );
                    ensure!(threshold.is_finite(), "node {idx}: threshold is not finite");
                    for child in [left, right] {
                        ensure!(
                            *child > idx && *child < self.nodes.len(),
                            "node {idx}: child {child} must point forward within the tree"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf_for(&self, features: &[f64]) -> PipelineResult<u32> {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { leaf }) => return Ok(*leaf),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features.get(*feature).copied().ok_or_else(|| {
                        PipelineError::PredictionFailed(format!("missing feature {feature}"))
                    })?;
                    idx = if value < *threshold { *left } else { *right };
                }
                None => {
                    return Err(PipelineError::PredictionFailed(format!(
                        "dangling tree node {idx}"
                    )))
                }
            }
        }
    }
}

/// Decision-tree ensemble voting by majority; ties go to the lowest class code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestClassifier {
    /// Feature count.
    pub n_features: usize,
    /// Class count.
    pub n_classes: usize,
    /// Trained column order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    /// Member trees.
    pub trees: Vec<DecisionTree>,
}

impl ForestClassifier {
    fn validate(&self) -> Result<()> {
        ensure!(self.n_features > 0, "forest declares no features");
        ensure!(self.n_classes > 0, "forest declares no classes");
        ensure!(!self.trees.is_empty(), "forest has no trees");
        if let Some(names) = &self.feature_names {
            ensure!(
                names.len() == self.n_features,
                "{} feature names for {} features",
                names.len(),
                self.n_features
            );
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .with_context(|| format!("tree {idx}"))?;
        }
        Ok(())
    }
}

impl Predictor for ForestClassifier {
    fn predict(&self, record: &FeatureRecord) -> PipelineResult<i64> {
        check_input(record, self.n_features)?;
        let mut votes = vec![0_u32; self.n_classes];
        for tree in &self.trees {
            let leaf = tree.leaf_for(record.values())? as usize;
            let slot = votes.get_mut(leaf).ok_or_else(|| {
                PipelineError::PredictionFailed(format!("tree voted for unknown class {leaf}"))
            })?;
            *slot += 1;
        }
        let winner = argmax(votes.into_iter().map(f64::from))
            .ok_or_else(|| PipelineError::PredictionFailed("forest cast no votes".into()))?;
        as_code(winner)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> Option<usize> {
        Some(self.n_classes)
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
}

/// Linear classifier scoring each class as `weights[c] . x + bias[c]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    /// One weight row per class.
    pub weights: Vec<Vec<f64>>,
    /// One bias per class.
    pub bias: Vec<f64>,
    /// Trained column order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
}

impl LinearClassifier {
    fn validate(&self) -> Result<()> {
        let Some(first) = self.weights.first() else {
            bail!("linear model has no classes");
        };
        ensure!(!first.is_empty(), "linear model declares no features");
        ensure!(
            self.weights.iter().all(|row| row.len() == first.len()),
            "weight rows differ in length"
        );
        ensure!(
            self.bias.len() == self.weights.len(),
            "{} biases for {} classes",
            self.bias.len(),
            self.weights.len()
        );
        ensure!(
            self.weights.iter().flatten().chain(&self.bias).all(|w| w.is_finite()),
            "non-finite coefficient"
        );
        if let Some(names) = &self.feature_names {
            ensure!(
                names.len() == first.len(),
                "{} feature names for {} features",
                names.len(),
                first.len()
            );
        }
        Ok(())
    }
}

impl Predictor for LinearClassifier {
    fn predict(&self, record: &FeatureRecord) -> PipelineResult<i64> {
        check_input(record, self.n_features())?;
        let scores = self.weights.iter().zip(&self.bias).map(|(row, bias)| {
            row.iter()
                .zip(record.values())
                .map(|(weight, value)| weight * value)
                .sum::<f64>()
                + bias
        });
        let winner = argmax(scores)
            .ok_or_else(|| PipelineError::PredictionFailed("linear model has no classes".into()))?;
        as_code(winner)
    }

    fn n_features(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn n_classes(&self) -> Option<usize> {
        Some(self.weights.len())
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
}
