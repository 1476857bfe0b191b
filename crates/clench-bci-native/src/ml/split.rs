//! Stratified train/test split

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::error::{PipelineError, PipelineResult};

/// Indices of the two partitions, each in ascending order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    /// Training indices
    pub train: Vec<usize>,
    /// Test indices
    pub test: Vec<usize>,
}

/// Split `targets` so every class appears in both partitions.
///
/// Each class with `n` members contributes `round(n * test_fraction)`
/// members to the test set, clamped to `1..=n-1`. The same seed always
/// yields the same split.
///
/// # Errors
///
/// - [`PipelineError::InvalidConfig`] if `test_fraction` is outside `(0, 1)`
/// - [`PipelineError::InsufficientData`] for fewer than two classes or a
///   class with fewer than two members
pub fn stratified_split(targets: &[usize], test_fraction: f64, seed: u64) -> PipelineResult<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidConfig {
            reason: format!("test fraction must be in (0, 1), got {test_fraction}"),
        });
    }

    let n_classes = targets.iter().max().map_or(0, |&m| m + 1);
    let mut by_class: Vec<(usize, Vec<usize>)> = (0..n_classes).map(|c| (c, Vec::new())).collect();
    for (i, &t) in targets.iter().enumerate() {
        by_class[t].1.push(i);
    }
    by_class.retain(|(_, members)| !members.is_empty());

    if by_class.len() < 2 {
        return Err(PipelineError::insufficient(format!(
            "need at least 2 classes, got {}",
            by_class.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = Split {
        train: Vec::new(),
        test: Vec::new(),
    };

    for (class, mut members) in by_class {
        let n = members.len();
        if n < 2 {
            return Err(PipelineError::insufficient(format!(
                "class {class} has a single epoch; need 2 to stratify"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n_test = ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1);

        members.shuffle(&mut rng);
        split.test.extend_from_slice(&members[..n_test]);
        split.train.extend_from_slice(&members[n_test..]);
    }

    split.train.sort_unstable();
    split.test.sort_unstable();
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_class_in_both_partitions() {
        let targets: Vec<usize> = (0..30).map(|i| i % 3).collect();
        let split = stratified_split(&targets, 0.2, 42).unwrap();

        assert_eq!(split.train.len() + split.test.len(), 30);
        assert_eq!(split.test.len(), 6);
        for class in 0..3 {
            assert!(split.train.iter().any(|&i| targets[i] == class));
            assert!(split.test.iter().any(|&i| targets[i] == class));
        }
    }

    #[test]
    fn test_partitions_are_disjoint() {
        let targets: Vec<usize> = (0..25).map(|i| i % 2).collect();
        let split = stratified_split(&targets, 0.3, 1).unwrap();
        assert!(split.test.iter().all(|i| !split.train.contains(i)));
    }

    #[test]
    fn test_seed_determinism() {
        let targets: Vec<usize> = (0..40).map(|i| i % 4).collect();
        let a = stratified_split(&targets, 0.25, 42).unwrap();
        let b = stratified_split(&targets, 0.25, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_class_keeps_one_each_side() {
        let targets = vec![0, 0, 1, 1, 1, 1, 1, 1, 1, 1];
        let split = stratified_split(&targets, 0.2, 0).unwrap();
        assert_eq!(split.test.iter().filter(|&&i| targets[i] == 0).count(), 1);
        assert_eq!(split.train.iter().filter(|&&i| targets[i] == 0).count(), 1);
    }

    #[test]
    fn test_singleton_class_rejected() {
        let result = stratified_split(&[0, 0, 0, 1], 0.2, 42);
        assert!(matches!(result, Err(PipelineError::InsufficientData { .. })));
    }

    #[test]
    fn test_single_class_rejected() {
        let result = stratified_split(&[0, 0, 0, 0], 0.2, 42);
        assert!(matches!(result, Err(PipelineError::InsufficientData { .. })));
    }

    #[test]
    fn test_bad_fraction_rejected() {
        assert!(matches!(
            stratified_split(&[0, 0, 1, 1], 1.0, 42),
            Err(PipelineError::InvalidConfig { .. })
        ));
    }
}
