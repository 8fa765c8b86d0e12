// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the rate guard.
//!
//! Each guard owns its own [`Registry`] so that several guards (and tests)
//! can coexist in one process.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::guard::Verdict;

pub struct GuardMetrics {
    registry: Registry,
    decisions: IntCounterVec,
    bot_requests: IntCounter,
    blocks: IntCounter,
    tracked_ips: IntGauge,
    blocked_ips: IntGauge,
}

impl GuardMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new("rate_guard_decisions_total", "Request verdicts by outcome"),
            &["verdict"],
        )?;
        let bot_requests = IntCounter::new(
            "rate_guard_bot_requests_total",
            "Requests exempted as known crawlers",
        )?;
        let blocks = IntCounter::new("rate_guard_blocks_total", "IPs newly added to the block list")?;
        let tracked_ips = IntGauge::new("rate_guard_tracked_ips", "IPs with a live request counter")?;
        let blocked_ips = IntGauge::new("rate_guard_blocked_ips", "IPs currently blocked")?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(bot_requests.clone()))?;
        registry.register(Box::new(blocks.clone()))?;
        registry.register(Box::new(tracked_ips.clone()))?;
        registry.register(Box::new(blocked_ips.clone()))?;

        Ok(Self {
            registry,
            decisions,
            bot_requests,
            blocks,
            tracked_ips,
            blocked_ips,
        })
    }

    pub fn record_verdict(&self, verdict: Verdict) {
        self.decisions.with_label_values(&[verdict.as_str()]).inc();
    }

    pub fn record_bot(&self) {
        self.bot_requests.inc();
    }

    pub fn record_block(&self) {
        self.blocks.inc();
    }

    pub fn set_sizes(&self, tracked: usize, blocked: usize) {
        self.tracked_ips.set(i64::try_from(tracked).unwrap_or(i64::MAX));
        self.blocked_ips.set(i64::try_from(blocked).unwrap_or(i64::MAX));
    }

    pub fn decisions(&self, verdict: Verdict) -> u64 {
        self.decisions.with_label_values(&[verdict.as_str()]).get()
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for GuardMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardMetrics").finish_non_exhaustive()
    }
}
