use anyhow::{bail, Result};
use rand::Rng;

/// Fixed outcome table; every entry is equally likely.
///
/// `[0, 0, 2000, 5000, 10000]` wins 60% of the time, paying 2000, 5000 or
/// 10000 with equal probability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutTable {
    outcomes: Vec<u64>,
}

impl PayoutTable {
    pub fn new(outcomes: Vec<u64>) -> Result<Self> {
        if outcomes.is_empty() {
            bail!("win table must have at least one outcome");
        }
        Ok(Self { outcomes })
    }

    pub fn outcomes(&self) -> &[u64] {
        &self.outcomes
    }

    /// Pick one outcome using the supplied RNG.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        self.outcomes[rng.random_range(0..self.outcomes.len())]
    }

    /// Pick one outcome using the thread-local RNG.
    pub fn draw_payout(&self) -> u64 {
        self.draw(&mut rand::rng())
    }

    pub fn win_probability(&self) -> f64 {
        let wins = self.outcomes.iter().filter(|&&p| p > 0).count();
        wins as f64 / self.outcomes.len() as f64
    }

    pub fn expected_payout(&self) -> f64 {
        self.outcomes.iter().map(|&p| p as f64).sum::<f64>() / self.outcomes.len() as f64
    }
}
