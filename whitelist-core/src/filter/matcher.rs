//! Client address and destination host matching

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use wildmatch::WildMatch;

/// Matcher for request source addresses
#[derive(Debug, Clone, Default)]
pub struct ClientMatcher {
    ipv4_ranges: Vec<Ipv4Net>,
    ipv6_ranges: Vec<Ipv6Net>,
}

impl ClientMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address range; single addresses are /32 or /128 ranges
    pub fn add_range(&mut self, range: IpNet) {
        match range {
            IpNet::V4(net) => self.ipv4_ranges.push(net),
            IpNet::V6(net) => self.ipv6_ranges.push(net),
        }
    }

    /// Check if an IP address falls in any range
    pub fn matches(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(ipv4) => self.ipv4_ranges.iter().any(|net| net.contains(&ipv4)),
            IpAddr::V6(ipv6) => match ipv6.to_ipv4_mapped() {
                Some(ipv4) => self.matches(IpAddr::V4(ipv4)),
                None => self.ipv6_ranges.iter().any(|net| net.contains(&ipv6)),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4_ranges.is_empty() && self.ipv6_ranges.is_empty()
    }
}

/// Matcher for request hosts
#[derive(Debug, Clone, Default)]
pub struct DestinationMatcher {
    patterns: Vec<WildMatch>,
}

impl DestinationMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hostname or `*.`-prefixed wildcard pattern
    pub fn add_pattern(&mut self, pattern: &str) {
        self.patterns
            .push(WildMatch::new(&pattern.trim().to_ascii_lowercase()));
    }

    /// Check if a hostname matches any pattern, ignoring case and a trailing dot
    pub fn matches(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.patterns.iter().any(|p| p.matches(&host))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
