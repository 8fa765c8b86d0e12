// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Set of blocked IPs. Blocks never expire on their own.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct BlockList {
    blocked: HashSet<String>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `ip`. Returns false if it was already blocked.
    pub fn block(&mut self, ip: &str) -> bool {
        if self.blocked.contains(ip) {
            return false;
        }
        self.blocked.insert(ip.to_string())
    }

    /// Remove `ip`. Returns false if it was not blocked.
    pub fn unblock(&mut self, ip: &str) -> bool {
        self.blocked.remove(ip)
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.contains(ip)
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    /// Blocked IPs in lexicographic order.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ips: Vec<String> = self.blocked.iter().cloned().collect();
        ips.sort();
        ips
    }

    pub fn replace<I>(&mut self, ips: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.blocked = ips.into_iter().collect();
    }
}
