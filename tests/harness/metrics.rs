// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outcome tallies for flood simulation results.

use std::collections::HashMap;

/// Collects outcomes during a simulation.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    /// Count of requests by outcome
    outcomes: HashMap<Outcome, usize>,
    /// Count of requests by IP
    requests_per_ip: HashMap<String, usize>,
    /// Index of the first blocked request per IP
    first_block: HashMap<String, usize>,
}

/// Possible outcomes for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Allowed,
    AllowedCrawler,
    Blocked,
}

impl AttackMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request outcome. `index` is the request's 0-based position
    /// among requests from the same IP.
    pub fn record(&mut self, outcome: Outcome, ip: &str, index: usize) {
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        *self.requests_per_ip.entry(ip.to_string()).or_insert(0) += 1;
        if outcome == Outcome::Blocked {
            self.first_block.entry(ip.to_string()).or_insert(index);
        }
    }

    /// Get total request count.
    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    /// Get count for a specific outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Index of the first blocked request from `ip`.
    pub fn first_block(&self, ip: &str) -> Option<usize> {
        self.first_block.get(ip).copied()
    }

    /// Get block rate (ratio of blocked to total).
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.count(Outcome::Blocked) as f64 / total as f64
    }

    /// Generate a summary report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            total_requests: self.total_requests(),
            allowed: self.count(Outcome::Allowed),
            allowed_crawler: self.count(Outcome::AllowedCrawler),
            blocked: self.count(Outcome::Blocked),
            block_rate: self.block_rate(),
            unique_ips: self.requests_per_ip.len(),
            blocked_ips: self.first_block.len(),
        }
    }
}

/// Summary report of a simulation.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub total_requests: usize,
    pub allowed: usize,
    pub allowed_crawler: usize,
    pub blocked: usize,
    pub block_rate: f64,
    pub unique_ips: usize,
    pub blocked_ips: usize,
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Flood Simulation Report ===")?;
        writeln!(f, "Total Requests:    {}", self.total_requests)?;
        writeln!(f)?;
        writeln!(f, "--- Outcomes ---")?;
        writeln!(f, "Allowed:           {}", self.allowed)?;
        writeln!(f, "Allowed (crawler): {}", self.allowed_crawler)?;
        writeln!(f, "Blocked:           {}", self.blocked)?;
        writeln!(f, "Block Rate:        {:.1}%", self.block_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "--- Distribution ---")?;
        writeln!(f, "Unique IPs:        {}", self.unique_ips)?;
        writeln!(f, "Blocked IPs:       {}", self.blocked_ips)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        let mut metrics = AttackMetrics::new();

        metrics.record(Outcome::Allowed, "10.0.0.1", 0);
        metrics.record(Outcome::AllowedCrawler, "10.0.0.2", 0);
        metrics.record(Outcome::Blocked, "10.0.0.1", 1);
        metrics.record(Outcome::Blocked, "10.0.0.1", 2);

        assert_eq!(metrics.total_requests(), 4);
        assert_eq!(metrics.count(Outcome::Blocked), 2);
        assert_eq!(metrics.first_block("10.0.0.1"), Some(1));
        assert_eq!(metrics.first_block("10.0.0.2"), None);
        assert!((metrics.block_rate() - 0.5).abs() < 0.01);
    }
}
