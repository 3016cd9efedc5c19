//! CART classification tree (Gini impurity).
//!
//! Trees are stored as a flat node arena. A sample goes left when its
//! feature value is `<= threshold`; thresholds sit halfway between two
//! adjacent distinct training values.

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct TreeParams {
    /// Non-constant features inspected per split.
    pub max_features: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_features: 1,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    /// Class probabilities of the training samples that reached this leaf.
    Leaf { distribution: Vec<f64> },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// Training data borrowed for the duration of one fit.
struct TrainSet<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    n_features: usize,
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree on `samples` (indices into `x`/`y`, repeats allowed).
    ///
    /// `y` holds class indices in `0..n_classes`.
    pub fn fit<R: Rng + ?Sized>(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        samples: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let data = TrainSet {
            x,
            y,
            n_classes,
            n_features: x.first().map(|r| r.len()).unwrap_or(0),
        };
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(&data, samples.to_vec(), 0, params, rng);
        tree
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    pub fn predict_proba(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn grow<R: Rng + ?Sized>(
        &mut self,
        data: &TrainSet<'_>,
        samples: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> usize {
        let counts = class_counts(data, &samples);
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            distribution: distribution(&counts, samples.len()),
        });

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_deep = params.max_depth.map_or(false, |d| depth >= d);
        if pure || too_deep || samples.len() < params.min_samples_split {
            return idx;
        }

        let Some(split) = best_split(data, &samples, &counts, params.max_features, rng) else {
            return idx;
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&s| data.x[s][split.feature] <= split.threshold);

        let left = self.grow(data, left_samples, depth + 1, params, rng);
        let right = self.grow(data, right_samples, depth + 1, params, rng);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

fn class_counts(data: &TrainSet<'_>, samples: &[usize]) -> Vec<usize> {
    let mut counts = vec![0usize; data.n_classes];
    for &s in samples {
        counts[data.y[s]] += 1;
    }
    counts
}

fn distribution(counts: &[usize], total: usize) -> Vec<f64> {
    if total == 0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|&c| c as f64 / total as f64).collect()
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / t).powi(2)).sum::<f64>()
}

/// Lowest weighted child impurity over a random subset of features.
///
/// Features are visited in shuffled order until `max_features` non-constant
/// ones have been scanned. Constant features do not count toward the limit.
fn best_split<R: Rng + ?Sized>(
    data: &TrainSet<'_>,
    samples: &[usize],
    counts: &[usize],
    max_features: usize,
    rng: &mut R,
) -> Option<SplitCandidate> {
    let n = samples.len();
    let mut features: Vec<usize> = (0..data.n_features).collect();
    features.shuffle(rng);

    let mut best: Option<SplitCandidate> = None;
    let mut informative = 0;

    for feature in features {
        if informative >= max_features.max(1) && best.is_some() {
            break;
        }

        let mut values: Vec<(f64, usize)> = samples
            .iter()
            .map(|&s| (data.x[s][feature], data.y[s]))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (lo, hi) = (values[0].0, values[n - 1].0);
        if lo == hi {
            continue;
        }
        informative += 1;

        let mut left = vec![0usize; data.n_classes];
        let mut right = counts.to_vec();
        for i in 0..n - 1 {
            let class = values[i].1;
            left[class] += 1;
            right[class] -= 1;
            if values[i].0 == values[i + 1].0 {
                continue;
            }

            let n_left = i + 1;
            let n_right = n - n_left;
            let impurity = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / n as f64;

            if best.map_or(true, |b| impurity < b.impurity) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (values[i].0 + values[i + 1].0) / 2.0,
                    impurity,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn all_features(n: usize) -> TreeParams {
        TreeParams {
            max_features: n,
            ..Default::default()
        }
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[4, 0], 4), 0.0);
        assert!((gini(&[2, 2], 4) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_separable_data_fits_exactly() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0], vec![10.0], vec![11.0]];
        let y = vec![0, 0, 0, 1, 1];
        let samples: Vec<usize> = (0..x.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let tree = DecisionTree::fit(&x, &y, 2, &samples, &all_features(1), &mut rng);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_proba(&[2.5]), &[1.0, 0.0]);
        assert_eq!(tree.predict_proba(&[6.6]), &[0.0, 1.0]);
    }

    #[test]
    fn test_constant_features_make_a_leaf() {
        let x = vec![vec![5.0, 5.0], vec![5.0, 5.0], vec![5.0, 5.0]];
        let y = vec![0, 1, 1];
        let samples: Vec<usize> = (0..x.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let tree = DecisionTree::fit(&x, &y, 2, &samples, &all_features(2), &mut rng);
        assert_eq!(tree.node_count(), 1);
        let p = tree.predict_proba(&[5.0, 5.0]);
        assert!((p[1] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let y = vec![0, 1, 0, 1, 0, 1, 0, 1];
        let samples: Vec<usize> = (0..x.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let params = TreeParams {
            max_features: 1,
            max_depth: Some(2),
            min_samples_split: 2,
        };

        let tree = DecisionTree::fit(&x, &y, 2, &samples, &params, &mut rng);
        assert!(tree.depth() <= 2);
    }
}
