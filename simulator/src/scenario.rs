//! Simulation scenarios.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// An operation a simulated client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deposit,
    Withdraw,
    Transfer,
    Interest,
    Reverse,
}

/// A named operation mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Relative weight of each operation.
    pub weights: Vec<(Operation, u32)>,
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "deposits" => Ok(Self::deposits()),
            "transfers" => Ok(Self::transfers()),
            "mixed" => Ok(Self::mixed()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Every client deposits into random accounts.
    fn deposits() -> Self {
        Self {
            name: "deposits".to_string(),
            description: "Concurrent deposits only".to_string(),
            weights: vec![(Operation::Deposit, 1)],
        }
    }

    /// Money only moves between accounts, so the total never changes.
    fn transfers() -> Self {
        Self {
            name: "transfers".to_string(),
            description: "Concurrent transfers in both directions".to_string(),
            weights: vec![(Operation::Transfer, 1)],
        }
    }

    /// Every operation kind. Interest and deposits add money, withdrawals remove it.
    fn mixed() -> Self {
        Self {
            name: "mixed".to_string(),
            description: "Deposits, withdrawals, transfers, interest and reversals".to_string(),
            weights: vec![
                (Operation::Deposit, 30),
                (Operation::Withdraw, 25),
                (Operation::Transfer, 30),
                (Operation::Interest, 5),
                (Operation::Reverse, 10),
            ],
        }
    }

    /// Draw an operation according to the weights.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Operation {
        let total: u32 = self.weights.iter().map(|(_, w)| w).sum();
        let mut roll = rng.gen_range(0..total.max(1));
        for (operation, weight) in &self.weights {
            if roll < *weight {
                return *operation;
            }
            roll -= weight;
        }
        Operation::Deposit
    }

    /// Whether the scenario can only move money between accounts.
    pub fn conserves_total(&self) -> bool {
        self.weights
            .iter()
            .all(|(operation, weight)| *operation == Operation::Transfer || *weight == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_load() {
        assert!(Scenario::load("mixed").is_ok());
        assert!(Scenario::load("transfers").unwrap().conserves_total());
        assert!(!Scenario::load("deposits").unwrap().conserves_total());
        assert!(Scenario::load("unknown").is_err());
    }

    #[test]
    fn test_pick_follows_weights() {
        let scenario = Scenario::load("transfers").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(scenario.pick(&mut rng), Operation::Transfer);
        }

        let mixed = Scenario::load("mixed").unwrap();
        let picks: std::collections::HashSet<_> = (0..1000).map(|_| mixed.pick(&mut rng)).collect();
        assert_eq!(picks.len(), 5);
    }
}
