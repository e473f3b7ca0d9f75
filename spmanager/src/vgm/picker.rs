//! Weighted random selection over free storage.

use rand::Rng;

/// Picks an id with probability proportional to its free-storage ratio.
///
/// Candidates with no staked storage, or whose usage has reached
/// `max_usage` of the staked storage, are never added.
#[derive(Debug, Clone)]
pub struct FreeStorageWeightPicker {
    max_usage: f64,
    weights: Vec<(u32, f64)>,
}

impl FreeStorageWeightPicker {
    pub fn new(max_usage: f64) -> Self {
        Self {
            max_usage,
            weights: Vec::new(),
        }
    }

    /// Adds a candidate. Returns false if it was excluded.
    pub fn add(&mut self, id: u32, staking_size: u64, used_size: u64) -> bool {
        if staking_size == 0 || used_size as f64 >= self.max_usage * staking_size as f64 {
            return false;
        }
        let weight = (staking_size - used_size) as f64 / staking_size as f64;
        self.weights.push((id, weight));
        true
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight of a candidate, if it was added.
    pub fn weight(&self, id: u32) -> Option<f64> {
        self.weights.iter().find(|(i, _)| *i == id).map(|(_, w)| *w)
    }

    pub fn pick(&self) -> Option<u32> {
        self.pick_with(&mut rand::rng())
    }

    /// Draws `r` uniformly in `[0, total)` and returns the first candidate
    /// whose cumulative weight exceeds it.
    pub fn pick_with<R: Rng>(&self, rng: &mut R) -> Option<u32> {
        let total: f64 = self.weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        let draw = rng.random::<f64>() * total;
        let mut cumulative = 0.0;
        for (id, weight) in &self.weights {
            cumulative += weight;
            if cumulative > draw {
                return Some(*id);
            }
        }
        // Rounding can leave the draw at the top of the range.
        self.weights.last().map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_excludes_full_and_unstaked() {
        let mut picker = FreeStorageWeightPicker::new(0.95);
        assert!(!picker.add(1, 0, 0));
        assert!(!picker.add(2, 100, 95));
        assert!(picker.add(3, 100, 94));
        assert_eq!(picker.len(), 1);
        assert!((picker.weight(3).unwrap() - 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_empty_picker_picks_nothing() {
        let picker = FreeStorageWeightPicker::new(0.95);
        assert_eq!(picker.pick(), None);
    }

    #[test]
    fn test_single_candidate_always_wins() {
        let mut picker = FreeStorageWeightPicker::new(0.95);
        picker.add(7, 100, 50);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(picker.pick_with(&mut rng), Some(7));
        }
    }

    #[test]
    fn test_distribution_follows_free_ratio() {
        let mut picker = FreeStorageWeightPicker::new(0.95);
        picker.add(1, 100, 10);
        picker.add(2, 100, 90);

        let mut rng = StdRng::seed_from_u64(42);
        let draws = 20_000;
        let mut first = 0;
        for _ in 0..draws {
            if picker.pick_with(&mut rng) == Some(1) {
                first += 1;
            }
        }
        let ratio = first as f64 / draws as f64;
        assert!((ratio - 0.9).abs() < 0.02, "ratio was {}", ratio);
    }
}
