//! CART regression tree builder
//!
//! Exact-greedy splits over quantized thresholds with fixed-point gradient
//! statistics. Each candidate feature is swept once in sorted order with
//! running gradient and hessian sums.

use realty_price_core::gbdt::{Node, Tree};

use crate::deterministic::SplitTieBreaker;

/// Growth limits for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Thresholds are multiples of this step (fixed-point units)
    pub quant_step: i64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_leaf: 1,
            quant_step: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: i64,
    gain: i128,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

/// Builds one tree from per-row gradients and hessians
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<i64>],
    gradients: &'a [i64],
    hessians: &'a [i64],
    /// Features this tree may split on
    columns: Vec<usize>,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<i64>],
        gradients: &'a [i64],
        hessians: &'a [i64],
        columns: Vec<usize>,
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), gradients.len());
        debug_assert_eq!(features.len(), hessians.len());
        Self {
            config,
            features,
            gradients,
            hessians,
            columns,
        }
    }

    /// Grow a tree over the rows in `rows`
    pub fn build(&self, rows: &[usize], weight: i64) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(rows, 0, 0, &mut nodes);
        Tree::new(nodes, weight)
    }

    fn build_node(&self, rows: &[usize], depth: usize, node_id: usize, nodes: &mut Vec<Node>) -> i32 {
        let current = nodes.len() as i32;

        let split = if depth < self.config.max_depth && rows.len() >= 2 * self.config.min_samples_leaf {
            self.find_best_split(rows, node_id)
        } else {
            None
        };

        let Some(split) = split else {
            nodes.push(Node::leaf(current, self.leaf_value(rows)));
            return current;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&r| self.features[r][split.feature_idx] <= split.threshold);

        nodes.push(Node::internal(current, split.feature_idx as i32, split.threshold, -1, -1));
        let left_idx = self.build_node(&left, depth + 1, node_id * 2 + 1, nodes);
        let right_idx = self.build_node(&right, depth + 1, node_id * 2 + 2, nodes);
        nodes[current as usize].left = left_idx;
        nodes[current as usize].right = right_idx;
        current
    }

    /// Index of the smallest step multiple that is `>= value`
    fn bucket(&self, value: i64) -> i64 {
        let step = self.config.quant_step;
        -(-value).div_euclid(step)
    }

    fn find_best_split(&self, rows: &[usize], node_id: usize) -> Option<SplitCandidate> {
        let (g_total, h_total) = self.sums(rows);
        let parent_score = score(g_total, h_total);
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;

        for &feature_idx in &self.columns {
            let mut keyed: Vec<(i64, usize)> = rows
                .iter()
                .map(|&r| (self.bucket(self.features[r][feature_idx]), r))
                .collect();
            keyed.sort_unstable();

            let (mut g_left, mut h_left) = (0i128, 0i128);
            for (pos, &(key, row)) in keyed.iter().enumerate() {
                g_left += self.gradients[row] as i128;
                h_left += self.hessians[row] as i128;

                let left_count = pos + 1;
                let at_boundary = keyed.get(pos + 1).map_or(false, |next| next.0 != key);
                if !at_boundary || left_count < min_leaf || rows.len() - left_count < min_leaf {
                    continue;
                }

                let gain = score(g_left, h_left) + score(g_total - g_left, h_total - h_left) - parent_score;
                if gain <= 0 {
                    continue;
                }

                let threshold = key * self.config.quant_step;
                let candidate = SplitCandidate {
                    feature_idx,
                    threshold,
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, threshold, node_id),
                };
                if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    fn sums(&self, rows: &[usize]) -> (i128, i128) {
        rows.iter().fold((0, 0), |(g, h), &r| {
            (g + self.gradients[r] as i128, h + self.hessians[r] as i128)
        })
    }

    /// Optimal leaf `-G / H`, in target fixed point
    fn leaf_value(&self, rows: &[usize]) -> i64 {
        let (g, h) = self.sums(rows);
        if h == 0 {
            return 0;
        }
        (-(g * HESSIAN_UNIT as i128) / h).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

/// Hessian assigned to each row under squared loss
pub const HESSIAN_UNIT: i64 = 1000;

/// `G² / H`, zero for an empty side
fn score(g: i128, h: i128) -> i128 {
    if h > 0 {
        g * g / h
    } else {
        0
    }
}
