//! Regression tree with fixed-point thresholds and leaves

use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, Result};

/// A split or a leaf
///
/// Split nodes carry a feature index and threshold and point at their
/// children; leaf nodes carry `leaf` and use `-1` for the other indices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    pub id: i32,
    pub left: i32,
    pub right: i32,
    pub feature_idx: i32,
    /// Rows with `feature <= threshold` go left
    pub threshold: i64,
    pub leaf: Option<i64>,
}

impl Node {
    pub fn internal(id: i32, feature_idx: i32, threshold: i64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    pub fn leaf(id: i32, value: i64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }
}

/// One boosting stage: nodes in breadth-first order plus the stage weight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tree {
    /// Node 0 is the root; children always have larger indices
    pub nodes: Vec<Node>,
    /// Fixed-point multiplier applied to the leaf value
    pub weight: i64,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, weight: i64) -> Self {
        Self { nodes, weight }
    }

    /// Leaf value reached by `features`
    ///
    /// Assumes a tree that passed [`Tree::validate`] against the feature width.
    pub fn evaluate(&self, features: &[i64]) -> i64 {
        let mut idx = 0usize;
        while let Some(node) = self.nodes.get(idx) {
            if let Some(value) = node.leaf {
                return value;
            }
            let value = features.get(node.feature_idx as usize).copied().unwrap_or(0);
            idx = if value <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
        0
    }

    /// Check indices so traversal always terminates on a leaf
    pub fn validate(&self, feature_count: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(PricingError::ArtifactCorrupted("tree has no nodes".to_string()));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            for child in [node.left, node.right] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(PricingError::ArtifactCorrupted(format!(
                        "node {i} has invalid child index {child}"
                    )));
                }
            }
            if node.feature_idx < 0 || node.feature_idx as usize >= feature_count {
                return Err(PricingError::ArtifactCorrupted(format!(
                    "node {i} splits on feature {} of {feature_count}",
                    node.feature_idx
                )));
            }
        }
        Ok(())
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Longest root-to-leaf path, counted in splits
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut max = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                max = max.max(depths[i]);
                continue;
            }
            let next = depths[i] + 1;
            for child in [node.left, node.right] {
                if let Some(d) = depths.get_mut(child as usize) {
                    *d = next;
                }
            }
        }
        max
    }
}
