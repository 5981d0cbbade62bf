//! Simulation metrics.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::scenario::Operation;

/// Simulation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Total operations attempted.
    pub total_operations: u64,
    /// Operations that committed.
    pub successful_operations: u64,
    /// Operations the ledger rejected.
    pub rejected_operations: u64,
    /// Committed operations per kind.
    pub committed: BTreeMap<Operation, u64>,
    /// Rejections per error code.
    pub rejections: BTreeMap<String, u64>,
    /// Latency samples (microseconds).
    #[serde(skip)]
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_operations: 0,
            successful_operations: 0,
            rejected_operations: 0,
            committed: BTreeMap::new(),
            rejections: BTreeMap::new(),
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a committed operation.
    pub fn record_success(&mut self, operation: Operation, latency_us: u64) {
        self.total_operations += 1;
        self.successful_operations += 1;
        *self.committed.entry(operation).or_default() += 1;

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Record a rejected operation.
    pub fn record_rejection(&mut self, error_code: &str) {
        self.total_operations += 1;
        self.rejected_operations += 1;
        *self.rejections.entry(error_code.to_string()).or_default() += 1;
    }

    /// Get average latency in microseconds.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }

        self.successful_operations as f64 / self.total_operations as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_success(Operation::Deposit, 100);
        metrics.record_success(Operation::Deposit, 200);
        metrics.record_success(Operation::Transfer, 150);
        metrics.record_rejection("INSUFFICIENT_FUNDS");

        assert_eq!(metrics.total_operations, 4);
        assert_eq!(metrics.successful_operations, 3);
        assert_eq!(metrics.rejected_operations, 1);
        assert_eq!(metrics.committed[&Operation::Deposit], 2);
        assert_eq!(metrics.rejections["INSUFFICIENT_FUNDS"], 1);
        assert_eq!(metrics.average_latency_us(), 150);
        assert_eq!(metrics.p99_latency_us(), 200);
        assert_eq!(metrics.success_rate(), 0.75);
    }
}
