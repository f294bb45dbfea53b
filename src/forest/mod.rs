//! # Random forest classification
//!
//! A Gini decision tree and a bootstrap-aggregated forest with majority
//! voting. Training is reproducible: every tree derives its own `ChaCha8Rng`
//! from the forest seed, and trees are fitted in parallel with rayon.

use anyhow::{bail, Result};
use log::debug;
use ndarray::{Array2, ArrayView2, Axis};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How many candidate features each split draws at random.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// `ceil(sqrt(n_features))`, the usual classification default.
    Sqrt,
    /// A fixed number, clamped to the feature count.
    Fixed(usize),
    /// Every feature, which turns bagging into plain bootstrap aggregation.
    All,
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        let m = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        };
        m.max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Gini-impurity decision tree over dense class indices `0..n_classes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: MaxFeatures,
    n_classes: usize,
    n_features: usize,
}

impl DecisionTree {
    pub fn new() -> Self {
        DecisionTree {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            n_classes: 0,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = n.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Fits the tree on samples in `x` rows and dense class indices in `y`.
    pub fn fit<R: Rng>(
        &mut self,
        x: ArrayView2<f64>,
        y: &[usize],
        n_classes: usize,
        rng: &mut R,
    ) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 || x.ncols() == 0 {
            bail!("cannot fit a tree on an empty matrix");
        }
        if n_samples != y.len() {
            bail!("x has {} rows but y has {} labels", n_samples, y.len());
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            bail!("class index {bad} is out of range for {n_classes} classes");
        }

        self.n_classes = n_classes;
        self.n_features = x.ncols();
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.grow(x, y, &indices, 0, rng));
        Ok(())
    }

    fn grow<R: Rng>(
        &self,
        x: ArrayView2<f64>,
        y: &[usize],
        indices: &[usize],
        depth: usize,
        rng: &mut R,
    ) -> TreeNode {
        let counts = class_counts(y, indices, self.n_classes);
        let majority = argmax(&counts);

        let stop = indices.len() < self.min_samples_split
            || self.max_depth.is_some_and(|d| depth >= d)
            || counts.iter().filter(|&&c| c > 0).count() <= 1;
        if stop {
            return TreeNode::Leaf { class: majority };
        }

        let Some((feature, threshold)) = self.best_split(x, y, indices, &counts, rng) else {
            return TreeNode::Leaf { class: majority };
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] <= threshold);

        if left_idx.len() < self.min_samples_leaf || right_idx.len() < self.min_samples_leaf {
            return TreeNode::Leaf { class: majority };
        }

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.grow(x, y, &left_idx, depth + 1, rng)),
            right: Box::new(self.grow(x, y, &right_idx, depth + 1, rng)),
        }
    }

    /// Scans a random feature subset for the split with the best Gini gain.
    fn best_split<R: Rng>(
        &self,
        x: ArrayView2<f64>,
        y: &[usize],
        indices: &[usize],
        parent_counts: &[usize],
        rng: &mut R,
    ) -> Option<(usize, f64)> {
        let n_features = x.ncols();
        let n_candidates = self.max_features.resolve(n_features);
        let candidates = sample(rng, n_features, n_candidates);

        let n = indices.len() as f64;
        let parent_impurity = gini(parent_counts, indices.len());

        let mut best: Option<(usize, f64, f64)> = None;
        for feature in candidates {
            let mut pairs: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (x[[i, feature]], y[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left = vec![0usize; self.n_classes];
            let mut right = parent_counts.to_vec();
            let mut left_n = 0usize;
            let mut right_n = pairs.len();

            for w in 0..pairs.len() - 1 {
                let (value, class) = pairs[w];
                left[class] += 1;
                right[class] -= 1;
                left_n += 1;
                right_n -= 1;

                // Thresholds only between distinct neighboring values.
                let next = pairs[w + 1].0;
                if next <= value {
                    continue;
                }
                if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                    continue;
                }

                let weighted = (left_n as f64 * gini(&left, left_n)
                    + right_n as f64 * gini(&right, right_n))
                    / n;
                let gain = parent_impurity - weighted;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (value + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }

    /// Predicts a dense class index per row of `x`.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        let root = match &self.root {
            Some(root) => root,
            None => bail!("decision tree has not been fitted"),
        };
        if x.ncols() != self.n_features {
            bail!(
                "input has {} features but the tree was fitted on {}",
                x.ncols(),
                self.n_features
            );
        }
        Ok((0..x.nrows())
            .map(|i| classify(root, &x.row(i).to_vec()))
            .collect())
    }

    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(node: &TreeNode, sample: &[f64]) -> usize {
    match node {
        TreeNode::Leaf { class } => *class,
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if sample[*feature] <= *threshold {
                classify(left, sample)
            } else {
                classify(right, sample)
            }
        }
    }
}

fn class_counts(y: &[usize], indices: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in indices {
        counts[y[i]] += 1;
    }
    counts
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

fn argmax(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .max_by_key(|(_, &c)| c)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Bootstrap-aggregated forest of Gini trees with majority voting.
///
/// Labels are arbitrary `usize` class ids; they are remapped to dense indices
/// internally and mapped back on prediction. Vote ties resolve to the
/// smallest class id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: MaxFeatures,
    seed: u64,
    classes: Vec<usize>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        RandomForest {
            trees: Vec::new(),
            n_estimators: n_estimators.max(1),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = n.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Class ids seen during fitting, ascending.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[usize]) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 || x.ncols() == 0 {
            bail!("cannot fit a forest on an empty matrix");
        }
        if n_samples != y.len() {
            bail!("x has {} rows but y has {} labels", n_samples, y.len());
        }

        let mut classes: Vec<usize> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let dense: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).expect("label is in classes"))
            .collect();
        let n_classes = classes.len();

        debug!(
            "fitting forest: {} trees, {} samples, {} features, {} classes",
            self.n_estimators,
            n_samples,
            x.ncols(),
            n_classes
        );

        let trees: Result<Vec<DecisionTree>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(tree_idx as u64));

                let boot: Vec<usize> = (0..n_samples)
                    .map(|_| rng.random_range(0..n_samples))
                    .collect();
                let x_boot = x.select(Axis(0), &boot);
                let y_boot: Vec<usize> = boot.iter().map(|&i| dense[i]).collect();

                let mut tree = DecisionTree::new().with_max_features(self.max_features);
                if let Some(depth) = self.max_depth {
                    tree = tree.with_max_depth(depth);
                }
                tree = tree
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf);
                tree.fit(x_boot.view(), &y_boot, n_classes, &mut rng)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        self.classes = classes;
        self.n_features = x.ncols();
        Ok(())
    }

    /// Majority-vote prediction, returning original class ids.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (idx, &share) in row.iter().enumerate() {
                    if share > row[best] {
                        best = idx;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    /// Per-class vote shares, one row per sample, columns ordered as
    /// [`classes`](Self::classes).
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            bail!("random forest has not been fitted");
        }
        if x.ncols() != self.n_features {
            bail!(
                "input has {} features but the forest was fitted on {}",
                x.ncols(),
                self.n_features
            );
        }

        let votes: Result<Vec<Vec<usize>>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect();
        let votes = votes?;

        let n_samples = x.nrows();
        let n_classes = self.classes.len();
        let mut proba = Array2::zeros((n_samples, n_classes));
        for tree_votes in &votes {
            for (i, &class_idx) in tree_votes.iter().enumerate() {
                proba[[i, class_idx]] += 1.0;
            }
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    /// Fraction of samples where the prediction matches `y`.
    pub fn score(&self, x: ArrayView2<f64>, y: &[usize]) -> Result<f64> {
        if x.nrows() != y.len() {
            bail!("x has {} rows but y has {} labels", x.nrows(), y.len());
        }
        let predictions = self.predict(x)?;
        let hits = predictions
            .iter()
            .zip(y)
            .filter(|(p, t)| p == t)
            .count();
        Ok(hits as f64 / y.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [0.0, 0.1],
            [0.2, 0.0],
            [0.1, 0.2],
            [0.3, 0.1],
            [2.0, 2.1],
            [2.2, 2.0],
            [2.1, 2.2],
            [2.3, 2.1],
        ];
        let y = vec![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn tree_separates_blobs() {
        let (x, y) = two_blobs();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut tree = DecisionTree::new();
        tree.fit(x.view(), &y, 2, &mut rng).unwrap();

        assert_eq!(tree.predict(x.view()).unwrap(), y);
    }

    #[test]
    fn tree_respects_max_depth() {
        let (x, y) = two_blobs();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut tree = DecisionTree::new().with_max_depth(1);
        tree.fit(x.view(), &y, 2, &mut rng).unwrap();

        assert!(tree.depth() <= 2);
    }

    #[test]
    fn tree_rejects_out_of_range_class() {
        let x = array![[0.0], [1.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut tree = DecisionTree::new();
        assert!(tree.fit(x.view(), &[0, 5], 2, &mut rng).is_err());
    }

    #[test]
    fn forest_separates_blobs() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (x, y) = two_blobs();
        let mut forest = RandomForest::new(25).with_seed(3);
        forest.fit(x.view(), &y).unwrap();

        assert_eq!(forest.predict(x.view()).unwrap(), y);
        assert_eq!(forest.score(x.view(), &y).unwrap(), 1.0);
    }

    #[test]
    fn forest_is_reproducible_for_a_seed() {
        let (x, y) = two_blobs();

        let mut a = RandomForest::new(15).with_seed(11);
        a.fit(x.view(), &y).unwrap();
        let mut b = RandomForest::new(15).with_seed(11);
        b.fit(x.view(), &y).unwrap();

        assert_eq!(a.predict(x.view()).unwrap(), b.predict(x.view()).unwrap());
    }

    #[test]
    fn forest_keeps_original_class_ids() {
        let (x, _) = two_blobs();
        let y = vec![3, 3, 3, 3, 9, 9, 9, 9];
        let mut forest = RandomForest::new(25).with_seed(3);
        forest.fit(x.view(), &y).unwrap();

        assert_eq!(forest.classes(), &[3, 9]);
        assert_eq!(forest.predict(x.view()).unwrap(), y);
    }

    #[test]
    fn proba_rows_sum_to_one() {
        let (x, y) = two_blobs();
        let mut forest = RandomForest::new(10).with_seed(5);
        forest.fit(x.view(), &y).unwrap();

        let proba = forest.predict_proba(x.view()).unwrap();
        for row in proba.rows() {
            let sum: f64 = row.sum();
            assert!((sum - 1.0).abs() < 1e-12, "row sum {sum}");
        }
    }

    #[test]
    fn predict_feature_mismatch_fails() {
        let (x, y) = two_blobs();
        let mut forest = RandomForest::new(5).with_seed(1);
        forest.fit(x.view(), &y).unwrap();

        let narrow = array![[0.5]];
        assert!(forest.predict(narrow.view()).is_err());
        assert!(forest.predict_proba(narrow.view()).is_err());

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut tree = DecisionTree::new();
        tree.fit(x.view(), &y, 2, &mut rng).unwrap();
        assert!(tree.predict(narrow.view()).is_err());
    }

    #[test]
    fn predict_before_fit_fails() {
        let forest = RandomForest::new(5);
        let x = array![[0.0, 1.0]];
        assert!(forest.predict(x.view()).is_err());
    }

    #[test]
    fn shape_mismatch_fails() {
        let (x, _) = two_blobs();
        let mut forest = RandomForest::new(5);
        assert!(forest.fit(x.view(), &[0, 1]).is_err());
    }
}
