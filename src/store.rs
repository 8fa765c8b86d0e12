// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window request counters keyed by IP.
//!
//! Expiry is lazy: every observation sweeps out entries that have been idle
//! for longer than the window. There is no background reaper.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Counter state for one IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterEntry {
    /// Requests seen inside the current window
    pub count: u64,
    /// Time of the most recent request
    pub last_access: DateTime<Utc>,
    /// Last seen user agent, lower-cased
    #[serde(default)]
    pub user_agent: String,
}

/// Outcome of a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Count after this request
    pub count: u64,
    /// Whether the count now strictly exceeds the threshold
    pub threshold_crossed: bool,
}

/// A counter entry paired with its IP, as shown in admin listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRow {
    pub ip: String,
    pub count: u64,
    pub last_access: DateTime<Utc>,
    pub user_agent: String,
}

/// One page of counter rows, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterPage {
    pub items: Vec<CounterRow>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

/// Per-IP request counters with lazy expiry.
#[derive(Debug)]
pub struct CounterStore {
    window: TimeDelta,
    threshold: u64,
    entries: HashMap<String, CounterEntry>,
}

impl CounterStore {
    pub fn new(window: TimeDelta, threshold: u64) -> Self {
        Self {
            window,
            threshold,
            entries: HashMap::new(),
        }
    }

    /// Record one request from `ip` at `now`.
    ///
    /// Sweeps every expired entry first, then increments the counter for
    /// `ip`, creating it if needed, and stamps it with `now`.
    pub fn observe(&mut self, ip: &str, user_agent: &str, now: DateTime<Utc>) -> Observation {
        self.sweep(now);

        let entry = self
            .entries
            .entry(ip.to_string())
            .or_insert_with(|| CounterEntry {
                count: 0,
                last_access: now,
                user_agent: String::new(),
            });

        entry.count = entry.count.saturating_add(1);
        entry.last_access = now;
        entry.user_agent = user_agent.to_lowercase();

        Observation {
            count: entry.count,
            threshold_crossed: entry.count > self.threshold,
        }
    }

    /// Remove entries idle for longer than the window. Returns how many
    /// were removed.
    ///
    /// Entries whose last access lies after `now` are kept.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.window;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.signed_duration_since(entry.last_access) <= window);

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Swept expired counters");
        }
        removed
    }

    pub fn get(&self, ip: &str) -> Option<&CounterEntry> {
        self.entries.get(ip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every counter.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// List counters sorted by most recent access, paginated.
    ///
    /// `page` is 1-based; 0 is treated as 1. `per_page` must be non-zero.
    pub fn page(&self, page: usize, per_page: usize) -> CounterPage {
        let page = page.max(1);
        let per_page = per_page.max(1);

        let mut rows: Vec<CounterRow> = self
            .entries
            .iter()
            .map(|(ip, entry)| CounterRow {
                ip: ip.clone(),
                count: entry.count,
                last_access: entry.last_access,
                user_agent: entry.user_agent.clone(),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.last_access
                .cmp(&a.last_access)
                .then_with(|| a.ip.cmp(&b.ip))
        });

        let total = rows.len();
        let items = rows
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        CounterPage {
            items,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        }
    }

    /// Copy of every entry, for export.
    pub fn snapshot(&self) -> HashMap<String, CounterEntry> {
        self.entries.clone()
    }

    /// Replace every entry, for import.
    pub fn replace(&mut self, entries: HashMap<String, CounterEntry>) {
        self.entries = entries;
    }
}
