use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use trip_core::{TripError, TripResult};

/// Row indices of a train/validation split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Shuffle `0..n` with a seeded RNG and hold out `ceil(n * valid_size)` rows.
pub fn train_valid_split(n: usize, valid_size: f64, seed: u64) -> TripResult<Split> {
    if !(valid_size > 0.0 && valid_size < 1.0) {
        return Err(TripError::Split(format!(
            "valid_size must be in (0, 1), got {valid_size}"
        )));
    }
    let n_valid = (n as f64 * valid_size).ceil() as usize;
    if n_valid == 0 || n_valid >= n {
        return Err(TripError::Split(format!(
            "{n} training rows cannot be split with valid_size {valid_size}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_valid);
    Ok(Split {
        train,
        valid: indices,
    })
}

/// Rows of `values` at `indices`, in index order.
pub fn take<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_and_disjointness() {
        let split = train_valid_split(8, 0.25, 459).unwrap();
        assert_eq!(split.valid.len(), 2);
        assert_eq!(split.train.len(), 6);
        let mut all: Vec<usize> = split.train.iter().chain(&split.valid).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn seeded_and_reproducible() {
        assert_eq!(
            train_valid_split(100, 0.2, 7).unwrap(),
            train_valid_split(100, 0.2, 7).unwrap()
        );
        assert_ne!(
            train_valid_split(100, 0.2, 7).unwrap(),
            train_valid_split(100, 0.2, 8).unwrap()
        );
    }

    #[test]
    fn rounds_validation_up() {
        assert_eq!(train_valid_split(10, 0.21, 0).unwrap().valid.len(), 3);
    }

    #[test]
    fn degenerate_splits_fail() {
        assert!(matches!(
            train_valid_split(1, 0.5, 0),
            Err(TripError::Split(_))
        ));
        assert!(train_valid_split(0, 0.2, 0).is_err());
        assert!(train_valid_split(10, 1.0, 0).is_err());
    }
}
