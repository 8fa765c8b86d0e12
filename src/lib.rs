// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! IP Rate Guard
//!
//! Per-IP request counting with automatic blocking:
//!
//! - Requests are counted per source IP over a one hour window
//! - Known search-engine crawlers are exempt, matched by user agent
//! - An IP exceeding 100 requests in the window is blocked until an
//!   operator unblocks it
//! - Idle counters expire lazily on the next observed request
//! - State is exported to and restored from a key-value store

pub mod blocklist;
pub mod classifier;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod metrics;
pub mod persistence;
pub mod store;

pub use config::Config;
pub use error::{GuardError, PersistenceError};
pub use guard::{RateGuard, Verdict};
pub use persistence::{FileStore, GuardSnapshot, KeyValueStore, MemoryStore};
