//! Difficulty bounds.
//!
//! Difficulty is a work threshold: a nonce is valid when the first eight
//! bytes of `Blake2b(header ‖ nonce)` read as a little-endian `u64` are at
//! least the difficulty. Raising it by `step` shrinks the valid region.

use helix_types::ConsensusParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DifficultyBounds {
    pub min: u64,
    pub max: u64,
    pub step: u64,
}

impl DifficultyBounds {
    pub fn from_params(params: &ConsensusParams) -> Self {
        Self {
            min: params.min_difficulty,
            max: params.max_difficulty.max(params.min_difficulty),
            step: params.difficulty_step,
        }
    }

    pub fn clamp(&self, difficulty: u64) -> u64 {
        difficulty.clamp(self.min, self.max)
    }

    pub fn contains(&self, difficulty: u64) -> bool {
        (self.min..=self.max).contains(&difficulty)
    }

    /// One step harder, capped at `max`.
    pub fn step_up(&self, difficulty: u64) -> u64 {
        self.clamp(difficulty.saturating_add(self.step))
    }

    /// One step easier, floored at `min`.
    pub fn step_down(&self, difficulty: u64) -> u64 {
        self.clamp(difficulty.saturating_sub(self.step))
    }

    /// Expected number of hashes to find a valid nonce.
    pub fn expected_attempts(difficulty: u64) -> f64 {
        let valid = (u64::MAX - difficulty) as f64 + 1.0;
        (u64::MAX as f64 + 1.0) / valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> DifficultyBounds {
        DifficultyBounds {
            min: 100,
            max: 1_000,
            step: 300,
        }
    }

    #[test]
    fn clamp_to_bounds() {
        let b = bounds();
        assert_eq!(b.clamp(5), 100);
        assert_eq!(b.clamp(5_000), 1_000);
        assert_eq!(b.clamp(500), 500);
        assert!(b.contains(1_000));
        assert!(!b.contains(1_001));
    }

    #[test]
    fn steps_saturate_at_bounds() {
        let b = bounds();
        assert_eq!(b.step_up(500), 800);
        assert_eq!(b.step_up(800), 1_000);
        assert_eq!(b.step_down(300), 100);
        assert_eq!(b.step_up(u64::MAX), 1_000);
    }

    #[test]
    fn expected_attempts_grow_with_difficulty() {
        assert!((DifficultyBounds::expected_attempts(0) - 1.0).abs() < 1e-9);
        let half = DifficultyBounds::expected_attempts(1u64 << 63);
        assert!((half - 2.0).abs() < 1e-6);
        assert!(DifficultyBounds::expected_attempts(0xff00_0000_0000_0000) > 250.0);
    }

    #[test]
    fn defaults_are_ordered() {
        let b = DifficultyBounds::from_params(&ConsensusParams::default());
        assert!(b.min <= b.max);
        assert!(b.contains(ConsensusParams::default().initial_difficulty));
    }
}
