// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Flood patterns for simulation.

/// Flood pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Simulated seconds between consecutive requests
    pub spacing_secs: i64,
    /// Number of unique IPs to rotate through
    pub unique_ips: usize,
    /// Fraction of requests sent with a crawler user agent (0.0-1.0)
    pub crawler_ratio: f64,
    /// Switch every IP to a crawler user agent once it is blocked
    pub spoof_after_block: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            spacing_secs: 1,
            unique_ips: 1,
            crawler_ratio: 0.0,
            spoof_after_block: false,
        }
    }
}

/// Predefined flood patterns.
impl AttackConfig {
    /// Single IP flood - basic DoS from one source.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 500,
            spacing_secs: 1,
            ..Default::default()
        }
    }

    /// Distributed flood - many IPs, each staying under the threshold.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 5000,
            spacing_secs: 0,
            unique_ips: 100,
            ..Default::default()
        }
    }

    /// Crawler traffic at high volume from one IP.
    pub fn crawler_flood() -> Self {
        Self {
            total_requests: 1000,
            spacing_secs: 0,
            crawler_ratio: 1.0,
            ..Default::default()
        }
    }

    /// Flood that switches to a crawler user agent once blocked.
    pub fn spoofed_crawler() -> Self {
        Self {
            total_requests: 330,
            spacing_secs: 1,
            unique_ips: 3,
            spoof_after_block: true,
            ..Default::default()
        }
    }

    /// Slow drip - each request arrives after the previous one expired.
    pub fn slow_drip() -> Self {
        Self {
            total_requests: 200,
            spacing_secs: 3601,
            ..Default::default()
        }
    }

    /// Steady trickle - one request a minute, never idle long enough for
    /// the counter to expire.
    pub fn steady_trickle() -> Self {
        Self {
            total_requests: 200,
            spacing_secs: 60,
            ..Default::default()
        }
    }

    /// Mixed crawler and client traffic across a few IPs.
    pub fn mixed_traffic() -> Self {
        Self {
            total_requests: 900,
            spacing_secs: 0,
            unique_ips: 3,
            crawler_ratio: 0.5,
            ..Default::default()
        }
    }
}
