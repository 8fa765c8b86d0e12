// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Known-crawler detection by user-agent substring.

use tracing::debug;

/// Matches user agents against a list of crawler signatures.
#[derive(Debug, Clone)]
pub struct BotClassifier {
    signatures: Vec<String>,
}

impl BotClassifier {
    /// Create a classifier from raw signatures.
    ///
    /// Signatures are lower-cased and empty entries dropped, since an empty
    /// pattern would match every user agent.
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = signatures
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { signatures }
    }

    /// Returns true when the user agent contains a known crawler signature.
    ///
    /// Comparison is case-insensitive. An empty user agent is never a bot.
    pub fn is_bot(&self, user_agent: &str) -> bool {
        if user_agent.is_empty() {
            return false;
        }

        let normalized = user_agent.to_lowercase();
        match self.signatures.iter().find(|sig| normalized.contains(sig.as_str())) {
            Some(sig) => {
                debug!(signature = %sig, "Known crawler");
                true
            }
            None => false,
        }
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }
}
