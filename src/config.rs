// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the IP rate guard.
//!
//! Defaults reproduce the fixed policy of the DDoS monitor: a one hour
//! window, blocking above 100 requests, and the usual search-engine
//! crawlers exempted.

use crate::error::GuardError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the rate guard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Counting and blocking policy
    #[serde(default)]
    pub guard: GuardConfig,

    /// State persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Operator access to the admin routes
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Counting and blocking policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Counting window and idle expiry in seconds (default: 3600)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Request count above which an IP is blocked (default: 100)
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Admin listing page size (default: 20)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// User-agent substrings that mark a request as a known crawler
    #[serde(default = "default_bot_signatures")]
    pub bot_signatures: Vec<String>,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the state blobs. `None` keeps state in memory only.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Seconds between background flushes (default: 30)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Admin route configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Bearer token required by the `/admin` routes. `None` disables them.
    #[serde(default)]
    pub token: Option<String>,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Paths served by the router itself; the metrics route may not reuse them.
const RESERVED_PATHS: &[&str] = &["/health", "/healthz", "/check"];

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_window_secs() -> u64 {
    3600 // 1 hour
}

fn default_threshold() -> u64 {
    100
}

fn default_page_size() -> usize {
    20
}

fn default_bot_signatures() -> Vec<String> {
    [
        "googlebot",
        "bingbot",
        "slurp",
        "duckduckbot",
        "baiduspider",
        "yandexbot",
        "sogou",
        "exabot",
        "facebot",
        "ia_archiver",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            guard: GuardConfig::default(),
            persistence: PersistenceConfig::default(),
            metrics: MetricsConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            threshold: default_threshold(),
            page_size: default_page_size(),
            bot_signatures: default_bot_signatures(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl GuardConfig {
    /// Get the counting window as a chrono delta
    pub fn window(&self) -> chrono::TimeDelta {
        i64::try_from(self.window_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

impl Config {
    /// Check settings that would otherwise fail at router construction.
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.metrics.enabled {
            self.metrics.route()?;
        }
        Ok(())
    }
}

impl MetricsConfig {
    /// The metrics route, with a leading slash.
    ///
    /// Fails if the path collides with another route or contains a path
    /// parameter or wildcard.
    pub fn route(&self) -> Result<String, GuardError> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        if path.contains(':') || path.contains('*') {
            return Err(GuardError::Config(format!(
                "metrics path {:?} may not contain parameters",
                path
            )));
        }
        let admin = path == "/admin" || path.starts_with("/admin/");
        if admin || RESERVED_PATHS.contains(&path.as_str()) {
            return Err(GuardError::Config(format!(
                "metrics path {:?} collides with a built-in route",
                path
            )));
        }
        Ok(path)
    }
}

impl PersistenceConfig {
    /// Get the flush interval
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}
