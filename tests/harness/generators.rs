// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for flood simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// User agents of well-known crawlers, in assorted spellings.
pub fn crawler_agents() -> Vec<&'static str> {
    vec![
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
        "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)",
        "Mozilla/5.0 (compatible; Yahoo! Slurp; http://help.yahoo.com/help/us/ysearch/slurp)",
        "DuckDuckBot/1.1; (+http://duckduckgo.com/duckduckbot.html)",
        "Mozilla/5.0 (compatible; Baiduspider/2.0)",
        "Mozilla/5.0 (compatible; YandexBot/3.0)",
        "Sogou web spider/4.0",
        "Mozilla/5.0 (compatible; Exabot/3.0)",
        "facebot",
        "ia_archiver (+http://www.alexa.com/site/help/webmasters)",
    ]
}

/// User agents of ordinary clients, including empty and odd ones.
pub fn client_agents() -> Vec<&'static str> {
    vec![
        "curl/7.1",
        "Wget/1.21.4",
        "python-requests/2.31.0",
        "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 Safari/605.1.15",
        "",
        "   ",
        "google", // Not a crawler signature on its own
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }
}
