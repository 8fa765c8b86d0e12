// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! The rate guard: counts requests per IP and blocks IPs that exceed the
//! threshold inside one window.
//!
//! Decision pipeline for every request:
//! 1. A blocked IP is answered `Blocked` without touching any counter.
//! 2. A known crawler is answered `Allowed` and never counted.
//! 3. Otherwise the IP's counter is incremented; crossing the threshold
//!    blocks the IP before the verdict is returned.
//!
//! Counters and the block list share one mutex. The lock is only held for
//! in-memory map updates; persistence snapshots are taken under the lock and
//! written after it is released.

use crate::blocklist::BlockList;
use crate::classifier::BotClassifier;
use crate::config::GuardConfig;
use crate::error::{GuardError, Result};
use crate::metrics::GuardMetrics;
use crate::persistence::{self, GuardSnapshot, KeyValueStore};
use crate::store::{CounterEntry, CounterPage, CounterStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Verdict for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allowed,
    Blocked,
}

impl Verdict {
    pub fn is_blocked(self) -> bool {
        matches!(self, Verdict::Blocked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Allowed => "allowed",
            Verdict::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct GuardState {
    counters: CounterStore,
    blocked: BlockList,
    /// Bumped on every mutation, used to skip redundant flushes
    revision: u64,
}

impl GuardState {
    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

/// Thread-safe per-IP request counter and block list.
#[derive(Debug)]
pub struct RateGuard {
    classifier: BotClassifier,
    page_size: usize,
    state: Mutex<GuardState>,
    metrics: GuardMetrics,
}

impl RateGuard {
    /// Create an empty guard with the given policy.
    pub fn new(config: GuardConfig) -> Result<Self> {
        let classifier = BotClassifier::new(&config.bot_signatures);
        let state = GuardState {
            counters: CounterStore::new(config.window(), config.threshold),
            blocked: BlockList::new(),
            revision: 0,
        };

        Ok(Self {
            classifier,
            page_size: config.page_size.max(1),
            state: Mutex::new(state),
            metrics: GuardMetrics::new()?,
        })
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// Whether `user_agent` belongs to a known crawler.
    pub fn is_bot(&self, user_agent: &str) -> bool {
        self.classifier.is_bot(user_agent)
    }

    /// Decide whether a request from `ip` may proceed.
    ///
    /// Fails with [`GuardError::InvalidInput`] when `ip` is empty or not an
    /// IP address; nothing is recorded in that case.
    pub fn decide(&self, ip: &str, user_agent: &str, now: DateTime<Utc>) -> Result<Verdict> {
        let ip = canonical_ip(ip)?;

        let mut state = self.lock();

        if state.blocked.is_blocked(&ip) {
            drop(state);
            debug!(%ip, "Request from blocked IP");
            self.metrics.record_verdict(Verdict::Blocked);
            return Ok(Verdict::Blocked);
        }

        if self.classifier.is_bot(user_agent) {
            drop(state);
            self.metrics.record_bot();
            self.metrics.record_verdict(Verdict::Allowed);
            return Ok(Verdict::Allowed);
        }

        let observation = state.counters.observe(&ip, user_agent, now);
        state.touch();

        let verdict = if observation.threshold_crossed {
            if state.blocked.block(&ip) {
                warn!(%ip, count = observation.count, "Request threshold exceeded, IP blocked");
                self.metrics.record_block();
            }
            Verdict::Blocked
        } else {
            Verdict::Allowed
        };

        self.metrics
            .set_sizes(state.counters.len(), state.blocked.len());
        drop(state);

        debug!(%ip, count = observation.count, %verdict, "Request observed");
        self.metrics.record_verdict(verdict);
        Ok(verdict)
    }

    /// Add `ip` to the block list. Returns false if it was already blocked.
    pub fn block(&self, ip: &str) -> Result<bool> {
        let ip = canonical_ip(ip)?;

        let mut state = self.lock();
        let added = state.blocked.block(&ip);
        if added {
            state.touch();
            self.metrics.record_block();
            self.metrics
                .set_sizes(state.counters.len(), state.blocked.len());
        }
        Ok(added)
    }

    /// Remove `ip` from the block list. Returns false if it was not blocked.
    pub fn unblock(&self, ip: &str) -> bool {
        let key = lookup_key(ip);

        let mut state = self.lock();
        let removed = state.blocked.unblock(&key);
        if removed {
            state.touch();
            self.metrics
                .set_sizes(state.counters.len(), state.blocked.len());
        }
        removed
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        let key = lookup_key(ip);
        self.lock().blocked.is_blocked(&key)
    }

    /// Drop every request counter. The block list is left alone.
    pub fn clear_counters(&self) {
        let mut state = self.lock();
        if !state.counters.is_empty() {
            state.counters.clear();
            state.touch();
        }
        self.metrics.set_sizes(0, state.blocked.len());
    }

    /// Counter for `ip`, if one is live.
    pub fn counter(&self, ip: &str) -> Option<CounterEntry> {
        let key = lookup_key(ip);
        self.lock().counters.get(&key).cloned()
    }

    /// List live counters, most recent first.
    ///
    /// `page` is 1-based. A `page_size` of 0 uses the configured default.
    pub fn list_counters(&self, page: usize, page_size: usize) -> CounterPage {
        let page_size = if page_size == 0 {
            self.page_size
        } else {
            page_size
        };
        self.lock().counters.page(page, page_size)
    }

    /// Snapshot of blocked IPs.
    pub fn list_blocked(&self) -> Vec<String> {
        self.lock().blocked.snapshot()
    }

    /// Operator unblock.
    pub fn admin_unblock(&self, ip: &str) -> bool {
        let removed = self.unblock(ip);
        info!(ip = %ip.trim(), removed, "Operator unblocked IP");
        removed
    }

    /// Operator clear of all counters.
    pub fn admin_clear_counters(&self) {
        self.clear_counters();
        info!("Operator cleared all request counters");
    }

    /// Number of state mutations so far.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Copy of the full state.
    pub fn export(&self) -> GuardSnapshot {
        let state = self.lock();
        GuardSnapshot {
            counters: state.counters.snapshot(),
            blocked: state.blocked.snapshot(),
        }
    }

    /// Replace the full state.
    ///
    /// Keys are re-rendered in canonical form; keys that are not IP addresses
    /// are dropped. When two keys collapse into one address, the most
    /// recently accessed counter wins, then the higher count, then the
    /// greater user agent.
    pub fn import(&self, snapshot: GuardSnapshot) {
        let mut counters: HashMap<String, CounterEntry> = HashMap::new();
        for (raw, entry) in snapshot.counters {
            let Ok(ip) = canonical_ip(&raw) else {
                warn!(ip = %raw, "Dropping counter with malformed IP");
                continue;
            };
            let rank = |e: &CounterEntry| (e.last_access, e.count, e.user_agent.clone());
            match counters.get(&ip) {
                Some(existing) if rank(existing) >= rank(&entry) => {}
                _ => {
                    counters.insert(ip, entry);
                }
            }
        }

        let mut blocked = Vec::with_capacity(snapshot.blocked.len());
        for raw in snapshot.blocked {
            match canonical_ip(&raw) {
                Ok(ip) => blocked.push(ip),
                Err(_) => warn!(ip = %raw, "Dropping blocked entry with malformed IP"),
            }
        }

        let mut state = self.lock();
        state.counters.replace(counters);
        state.blocked.replace(blocked);
        state.touch();
        self.metrics
            .set_sizes(state.counters.len(), state.blocked.len());

        info!(
            tracked = state.counters.len(),
            blocked = state.blocked.len(),
            "Imported guard state"
        );
    }

    /// Load state from `store`.
    ///
    /// On failure the error is logged and returned, and the guard keeps its
    /// current (at start-up, empty) state so requests keep flowing.
    pub fn restore(&self, store: &dyn KeyValueStore) -> Result<()> {
        match persistence::load_snapshot(store) {
            Ok(snapshot) => {
                self.import(snapshot);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load guard state, continuing in memory");
                Err(GuardError::Persistence(e))
            }
        }
    }

    /// Write state to `store`. Returns the revision that was written.
    pub fn persist(&self, store: &dyn KeyValueStore) -> Result<u64> {
        let (snapshot, revision) = {
            let state = self.lock();
            let snapshot = GuardSnapshot {
                counters: state.counters.snapshot(),
                blocked: state.blocked.snapshot(),
            };
            (snapshot, state.revision)
        };

        persistence::save_snapshot(store, &snapshot)?;
        debug!(revision, "Persisted guard state");
        Ok(revision)
    }
}

/// Parse and re-render an IP so equivalent spellings share one key.
fn canonical_ip(ip: &str) -> Result<String> {
    let trimmed = ip.trim();
    if trimmed.is_empty() {
        return Err(GuardError::InvalidInput("empty IP address".to_string()));
    }
    trimmed
        .parse::<IpAddr>()
        .map(|addr| addr.to_string())
        .map_err(|_| GuardError::InvalidInput(format!("malformed IP address: {:?}", trimmed)))
}

/// Key used for read and removal paths, which accept any string.
fn lookup_key(ip: &str) -> String {
    canonical_ip(ip).unwrap_or_else(|_| ip.trim().to_string())
}
