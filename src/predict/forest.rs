//! Seeded random forest classifier.
//!
//! Bagged CART trees with `floor(sqrt(n_features))` candidate features per
//! split. Predicted label = argmax of the tree-averaged class probabilities.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::ModelConfig;
use crate::predict::tree::{DecisionTree, TreeParams};
use crate::predict::{Classifier, ClassifierFactory, ModelError};

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub seed: u64,
    pub max_depth: Option<usize>,
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: 42,
            max_depth: None,
            bootstrap: true,
        }
    }
}

impl From<&ModelConfig> for ForestParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            n_estimators: config.n_estimators.max(1),
            seed: config.seed,
            max_depth: config.max_depth,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForestClassifier {
    params: ForestParams,
    /// Distinct training labels, ascending.
    classes: Vec<i64>,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            classes: Vec::new(),
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Tree-averaged probability per entry of [`Self::classes`].
    pub fn predict_proba(&self, features: &[i64]) -> Result<Vec<f64>, ModelError> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        if features.len() != self.n_features {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features,
                got: features.len(),
            });
        }

        let row: Vec<f64> = features.iter().map(|&v| v as f64).collect();
        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba(&row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, features: &[Vec<i64>], labels: &[i64]) -> Result<(), ModelError> {
        if features.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if features.len() != labels.len() {
            return Err(ModelError::ShapeMismatch {
                expected: features.len(),
                got: labels.len(),
            });
        }
        let n_features = features[0].len();
        if n_features == 0 {
            return Err(ModelError::Other("training rows have no features".to_string()));
        }
        if let Some(bad) = features.iter().find(|r| r.len() != n_features) {
            return Err(ModelError::ShapeMismatch {
                expected: n_features,
                got: bad.len(),
            });
        }

        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let y: Vec<usize> = labels
            .iter()
            .map(|l| classes.binary_search(l).unwrap_or(0))
            .collect();
        let x: Vec<Vec<f64>> = features
            .iter()
            .map(|r| r.iter().map(|&v| v as f64).collect())
            .collect();

        let tree_params = TreeParams {
            max_features: ((n_features as f64).sqrt() as usize).max(1),
            max_depth: self.params.max_depth,
            min_samples_split: 2,
        };

        let n = x.len();
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            let samples: Vec<usize> = if self.params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            trees.push(DecisionTree::fit(
                &x,
                &y,
                classes.len(),
                &samples,
                &tree_params,
                &mut rng,
            ));
        }

        self.classes = classes;
        self.n_features = n_features;
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, features: &[i64]) -> Result<i64, ModelError> {
        let proba = self.predict_proba(features)?;
        // First maximum wins, i.e. the smallest label on ties
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }
        Ok(self.classes[best])
    }
}

/// Builds identically seeded forests.
#[derive(Debug, Clone, Default)]
pub struct ForestFactory {
    pub params: ForestParams,
}

impl ForestFactory {
    pub fn new(params: ForestParams) -> Self {
        Self { params }
    }
}

impl ClassifierFactory for ForestFactory {
    fn build(&self) -> Box<dyn Classifier> {
        Box::new(RandomForestClassifier::new(self.params.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_set() -> (Vec<Vec<i64>>, Vec<i64>) {
        let x = vec![
            vec![1, 5, 9],
            vec![2, 6, 9],
            vec![3, 5, 8],
            vec![20, 30, 40],
            vec![21, 31, 41],
            vec![22, 29, 42],
        ];
        let y = vec![7, 7, 7, 44, 44, 44];
        (x, y)
    }

    #[test]
    fn test_learns_separable_labels() {
        let (x, y) = toy_set();
        let mut model = RandomForestClassifier::new(ForestParams::default());
        model.fit(&x, &y).unwrap();

        assert_eq!(model.classes(), &[7, 44]);
        assert_eq!(model.predict(&[2, 5, 9]).unwrap(), 7);
        assert_eq!(model.predict(&[21, 30, 41]).unwrap(), 44);
    }

    #[test]
    fn test_same_seed_same_probabilities() {
        let x: Vec<Vec<i64>> = (0..20).map(|i| vec![i % 7, (i * 3) % 11, i % 5]).collect();
        let y: Vec<i64> = (0..20).map(|i| (i * 13) % 6).collect();

        let mut a = RandomForestClassifier::new(ForestParams::default());
        let mut b = RandomForestClassifier::new(ForestParams::default());
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        for row in &x {
            assert_eq!(a.predict_proba(row).unwrap(), b.predict_proba(row).unwrap());
        }
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = toy_set();
        let mut model = RandomForestClassifier::new(ForestParams {
            n_estimators: 10,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let p = model.predict_proba(&[10, 10, 10]).unwrap();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_class_predicts_it() {
        let x = vec![vec![1, 2], vec![3, 4]];
        let y = vec![9, 9];
        let mut model = RandomForestClassifier::new(ForestParams::default());
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&[100, 100]).unwrap(), 9);
    }

    #[test]
    fn test_errors() {
        let mut model = RandomForestClassifier::new(ForestParams::default());
        assert_eq!(model.predict(&[1, 2]), Err(ModelError::NotFitted));
        assert_eq!(model.fit(&[], &[]), Err(ModelError::EmptyTrainingSet));
        assert!(matches!(
            model.fit(&[vec![1, 2], vec![1]], &[1, 2]),
            Err(ModelError::ShapeMismatch { .. })
        ));

        model.fit(&[vec![1, 2], vec![3, 4]], &[1, 2]).unwrap();
        assert_eq!(
            model.predict(&[1]),
            Err(ModelError::ShapeMismatch { expected: 2, got: 1 })
        );
    }
}
