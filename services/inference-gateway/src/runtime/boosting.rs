use serde::Deserialize;

use super::{ensure_finite, ArtifactError, ColumnRef, PredictError, Predictor};
use crate::features::FeatureFrame;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct BoostingSpec {
    init: f64,
    learning_rate: f64,
    trees: Vec<TreeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TreeSpec {
    nodes: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeSpec {
    Split { feature: String, threshold: f64, left: usize, right: usize },
    Leaf { value: f64 },
}

#[derive(Debug)]
enum Node {
    /// Rows with `feature <= threshold` go left.
    Split { feature: ColumnRef, threshold: f64, left: usize, right: usize },
    Leaf(f64),
}

/// Gradient boosted regression trees: `init + learning_rate * sum(tree(x))`.
///
/// Trees are stored as flat node arrays rooted at index 0. Children always
/// point forward, so evaluation terminates without a visited set.
#[derive(Debug)]
pub struct BoostedTrees {
    init: f64,
    learning_rate: f64,
    trees: Vec<Vec<Node>>,
}

impl BoostedTrees {
    pub(super) fn compile(spec: BoostingSpec) -> Result<Self, ArtifactError> {
        let init = ensure_finite("init", spec.init)?;
        let learning_rate = ensure_finite("learning_rate", spec.learning_rate)?;
        if learning_rate <= 0.0 { return Err(ArtifactError::Invalid("learning_rate must be positive".into())); }
        if spec.trees.is_empty() { return Err(ArtifactError::Invalid("ensemble has no trees".into())); }

        let mut trees = Vec::with_capacity(spec.trees.len());
        for (t, tree) in spec.trees.into_iter().enumerate() {
            if tree.nodes.is_empty() { return Err(ArtifactError::Invalid(format!("tree {t} has no nodes"))); }
            let len = tree.nodes.len();
            let mut nodes = Vec::with_capacity(len);
            for (i, node) in tree.nodes.into_iter().enumerate() {
                nodes.push(match node {
                    NodeSpec::Leaf { value } => Node::Leaf(ensure_finite(&format!("tree {t} node {i} value"), value)?),
                    NodeSpec::Split { feature, threshold, left, right } => {
                        for child in [left, right] {
                            if child <= i || child >= len {
                                return Err(ArtifactError::Invalid(format!("tree {t} node {i} has invalid child index {child}")));
                            }
                        }
                        Node::Split {
                            feature: ColumnRef::parse(&feature)?,
                            threshold: ensure_finite(&format!("tree {t} node {i} threshold"), threshold)?,
                            left,
                            right,
                        }
                    }
                });
            }
            trees.push(nodes);
        }
        Ok(Self { init, learning_rate, trees })
    }

    fn eval_tree(nodes: &[Node], frame: &FeatureFrame<'_>) -> Result<f64, PredictError> {
        let mut idx = 0;
        loop {
            match &nodes[idx] {
                Node::Leaf(v) => return Ok(*v),
                Node::Split { feature, threshold, left, right } => {
                    idx = if feature.eval(frame)? <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl Predictor for BoostedTrees {
    fn predict(&self, frame: &FeatureFrame<'_>) -> Result<f64, PredictError> {
        let mut acc = 0.0;
        for tree in &self.trees { acc += Self::eval_tree(tree, frame)?; }
        Ok(self.init + self.learning_rate * acc)
    }

    fn kind(&self) -> &'static str { "gradient_boosting" }
}
