//! Cross-validation splitters

use crate::error::{PhishnetError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 3, shuffle: false }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    PhishnetError::TrainingError("StratifiedKFold requires target array".to_string())
                })?;
                if y.len() != n_samples {
                    return Err(PhishnetError::ShapeError {
                        expected: format!("y length = {}", n_samples),
                        actual: format!("y length = {}", y.len()),
                    });
                }
                self.stratified_k_fold_split(y, *n_splits, *shuffle)
            }
        }
    }

    fn check_splits(n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(PhishnetError::InvalidParameter {
                name: "n_splits".to_string(),
                value: n_splits.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if n_samples < n_splits {
            return Err(PhishnetError::TrainingError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }
        Ok(())
    }

    fn stratified_k_fold_split(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        Self::check_splits(y.len(), n_splits)?;

        // Ordered by class so fold assignment does not depend on hash order
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal each class round-robin, continuing where the previous class stopped
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next = 0usize;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[next % n_splits].push(idx);
                next += 1;
            }
        }
        for fold in &mut folds {
            fold.sort_unstable();
        }

        Ok(Self::folds_to_splits(folds))
    }

    fn folds_to_splits(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
        (0..folds.len())
            .map(|fold_idx| {
                let train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                CVSplit {
                    train_indices,
                    test_indices: folds[fold_idx].clone(),
                    fold_idx,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_cover_every_row_once() {
        let y = Array1::from_iter((0..10).map(|i| if i < 4 { 1.0 } else { 0.0 }));
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true }).with_random_state(1);
        let splits = cv.split(10, Some(&y)).unwrap();
        assert_eq!(splits.len(), 3);

        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        for s in &splits {
            assert_eq!(s.train_indices.len() + s.test_indices.len(), 10);
        }
    }

    #[test]
    fn test_stratified_keeps_class_balance() {
        let y = Array1::from_iter((0..12).map(|i| if i % 3 == 0 { 1.0 } else { 0.0 }));
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: false });
        let splits = cv.split(12, Some(&y)).unwrap();

        for s in &splits {
            let positives = s.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(positives, 1);
            assert_eq!(s.test_indices.len(), 3);
        }
    }

    #[test]
    fn test_seeded_splits_repeat() {
        let y = Array1::from_iter((0..20).map(|i| (i % 2) as f64));
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true }).with_random_state(9);
        let a: Vec<Vec<usize>> = cv.split(20, Some(&y)).unwrap().into_iter().map(|s| s.test_indices).collect();
        let b: Vec<Vec<usize>> = cv.split(20, Some(&y)).unwrap().into_iter().map(|s| s.test_indices).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_split_counts() {
        let y = Array1::from_vec(vec![0.0, 1.0, 0.0, 1.0, 0.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 1, shuffle: false });
        assert!(cv.split(5, Some(&y)).is_err());

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 6, shuffle: false });
        assert!(cv.split(5, Some(&y)).is_err());

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 2, shuffle: false });
        assert!(cv.split(4, None).is_err());
        assert!(cv.split(4, Some(&y)).is_err());
    }
}
