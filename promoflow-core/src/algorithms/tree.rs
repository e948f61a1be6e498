//! Binary decision tree grown greedily on Gini impurity or entropy.

use crate::algorithms::Classifier;
use crate::algorithms::params::{self, Params};
use crate::data::labels::BinaryLabel;
use crate::error::PipelineError;
use crate::features::matrix::Matrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitCriterion {
    Gini,
    Entropy,
}

impl SplitCriterion {
    fn impurity(self, counts: [usize; 2]) -> f64 {
        let total = (counts[0] + counts[1]) as f64;
        if total == 0.0 {
            return 0.0;
        }
        let p = counts[1] as f64 / total;
        match self {
            Self::Gini => 2.0 * p * (1.0 - p),
            Self::Entropy => {
                let h = |q: f64| if q > 0.0 { -q * q.log2() } else { 0.0 };
                h(p) + h(1.0 - p)
            }
        }
    }
}

/// Arena node. Children are indices into [`DecisionTree::nodes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        label: BinaryLabel,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub criterion: SplitCriterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    #[serde(default)]
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    pub const FAMILY: &'static str = "decision_tree";

    pub fn from_params(p: &Params) -> Result<Self, PipelineError> {
        params::check_known(
            Self::FAMILY,
            p,
            &["criterion", "max_depth", "min_samples_split", "min_samples_leaf"],
        )?;
        let criterion = match params::get_str(p, "criterion", "gini")? {
            "gini" => SplitCriterion::Gini,
            "entropy" => SplitCriterion::Entropy,
            other => {
                return Err(PipelineError::config(format!(
                    "decision_tree: unknown criterion '{other}'"
                )));
            }
        };
        Ok(Self {
            criterion,
            max_depth: params::get_opt_usize(p, "max_depth", Some(8))?,
            min_samples_split: params::get_usize(p, "min_samples_split", 2)?.max(2),
            min_samples_leaf: params::get_usize(p, "min_samples_leaf", 1)?.max(1),
            nodes: Vec::new(),
        })
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    fn grow(&mut self, x: &Matrix, y: &[BinaryLabel], indices: Vec<usize>, depth: usize) -> usize {
        let counts = class_counts(y, &indices);
        let majority = if counts[1] > counts[0] {
            BinaryLabel::Positive
        } else {
            BinaryLabel::Negative
        };
        let node_id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { label: majority });

        let pure = counts[0] == 0 || counts[1] == 0;
        let depth_reached = self.max_depth.is_some_and(|max| depth >= max);
        if pure || depth_reached || indices.len() < self.min_samples_split {
            return node_id;
        }

        let Some((feature, threshold)) = self.best_split(x, y, &indices, counts) else {
            return node_id;
        };
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x.row(i)[feature] <= threshold);

        let left = self.grow(x, y, left_idx, depth + 1);
        let right = self.grow(x, y, right_idx, depth + 1);
        self.nodes[node_id] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_id
    }

    /// Best (feature, threshold) by weighted impurity decrease, or `None`
    /// when no split improves on the parent.
    fn best_split(
        &self,
        x: &Matrix,
        y: &[BinaryLabel],
        indices: &[usize],
        parent: [usize; 2],
    ) -> Option<(usize, f64)> {
        let n = indices.len() as f64;
        let parent_impurity = self.criterion.impurity(parent);
        let mut best: Option<(f64, usize, f64)> = None;
        let mut sorted = indices.to_vec();

        for feature in 0..x.cols() {
            sorted.sort_by(|&a, &b| x.row(a)[feature].total_cmp(&x.row(b)[feature]));
            let mut left = [0usize, 0usize];
            for pos in 0..sorted.len() - 1 {
                left[y[sorted[pos]].as_index()] += 1;
                let here = x.row(sorted[pos])[feature];
                let next = x.row(sorted[pos + 1])[feature];
                if here == next {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = sorted.len() - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }
                let right = [parent[0] - left[0], parent[1] - left[1]];
                let weighted = (n_left as f64 * self.criterion.impurity(left)
                    + n_right as f64 * self.criterion.impurity(right))
                    / n;
                let gain = parent_impurity - weighted;
                if gain > 1e-12 && best.is_none_or(|(g, _, _)| gain > g) {
                    best = Some((gain, feature, (here + next) / 2.0));
                }
            }
        }
        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

fn class_counts(y: &[BinaryLabel], indices: &[usize]) -> [usize; 2] {
    let mut counts = [0, 0];
    for &i in indices {
        counts[y[i].as_index()] += 1;
    }
    counts
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &Matrix, y: &[BinaryLabel]) -> Result<(), PipelineError> {
        if x.rows() == 0 {
            return Err(PipelineError::training("cannot fit on an empty matrix"));
        }
        self.nodes.clear();
        self.grow(x, y, (0..x.rows()).collect(), 0);
        Ok(())
    }

    fn predict_row(&self, row: &[f64]) -> BinaryLabel {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { label }) => return *label,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
                None => return BinaryLabel::Negative,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conjunction_data() -> (Matrix, Vec<BinaryLabel>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let a = i % 2;
            let b = (i / 2) % 2;
            rows.push(vec![a as f64, b as f64]);
            labels.push(BinaryLabel::from_index(a & b).unwrap());
        }
        (Matrix::from_rows(&rows).unwrap(), labels)
    }

    #[test]
    fn test_tree_fits_conjunction() {
        let (x, y) = conjunction_data();
        let mut tree = DecisionTree::from_params(&Params::new()).unwrap();
        tree.fit(&x, &y).unwrap();
        for (row, label) in x.iter_rows().zip(&y) {
            assert_eq!(tree.predict_row(row), *label);
        }
    }

    #[test]
    fn test_max_depth_is_respected() {
        let (x, y) = conjunction_data();
        let params: Params = serde_json::from_value(json!({"max_depth": 1})).unwrap();
        let mut tree = DecisionTree::from_params(&params).unwrap();
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn test_separable_split() {
        let x = Matrix::from_rows(&[vec![1.0], vec![2.0], vec![8.0], vec![9.0]]).unwrap();
        let y = [
            BinaryLabel::Negative,
            BinaryLabel::Negative,
            BinaryLabel::Positive,
            BinaryLabel::Positive,
        ];
        let mut tree = DecisionTree::from_params(&Params::new()).unwrap();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_row(&[4.9]), BinaryLabel::Negative);
        assert_eq!(tree.predict_row(&[5.1]), BinaryLabel::Positive);
    }

    #[test]
    fn test_gini_impurity() {
        assert_eq!(SplitCriterion::Gini.impurity([5, 5]), 0.5);
        assert_eq!(SplitCriterion::Gini.impurity([4, 0]), 0.0);
        assert!((SplitCriterion::Entropy.impurity([2, 2]) - 1.0).abs() < 1e-12);
    }
}
