use super::rng::{choice_without_replacement, Pcg64};
use crate::error::{CircuitError, Result};

/// Number of ids kept when sampling `len` candidates at `ratio`.
pub fn sample_size(len: usize, ratio: f64) -> usize {
    if ratio >= 1.0 {
        len
    } else {
        ((len as f64) * ratio).floor() as usize
    }
}

/// Rejects ratios that cannot select anything meaningful.
pub fn check_ratio(ratio: f64) -> Result<()> {
    if ratio.is_finite() && ratio >= 0.0 {
        Ok(())
    } else {
        Err(CircuitError::invalid(format!(
            "sampling_ratio must be a non-negative number, got {ratio}"
        )))
    }
}

/// Sorted sample of `candidates` (sorted, unique) at `ratio` with `seed`.
///
/// A ratio of 1 or more keeps every candidate.
pub fn sorted_choice(candidates: &[usize], ratio: f64, seed: u64) -> Vec<usize> {
    if ratio >= 1.0 {
        let mut all = candidates.to_vec();
        all.sort_unstable();
        return all;
    }
    let count = sample_size(candidates.len(), ratio);
    let mut rng = Pcg64::from_seed(seed);
    let mut picked: Vec<usize> = choice_without_replacement(&mut rng, candidates.len(), count)
        .into_iter()
        .map(|position| candidates[position])
        .collect();
    picked.sort_unstable();
    picked
}

/// Sorted sample of `0..population` at `ratio` with `seed`.
pub fn sorted_choice_range(population: usize, ratio: f64, seed: u64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..population).collect();
    }
    let count = sample_size(population, ratio);
    let mut rng = Pcg64::from_seed(seed);
    let mut picked = choice_without_replacement(&mut rng, population, count);
    picked.sort_unstable();
    picked
}
