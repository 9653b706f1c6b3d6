//! Access decision over a set of whitelist groups

use super::matcher::{ClientMatcher, DestinationMatcher};
use crate::error::{Result, ValidationError};
use crate::model::WhitelistGroup;
use std::net::IpAddr;

#[derive(Debug, Clone)]
struct GroupRule {
    name: String,
    clients: ClientMatcher,
    destinations: DestinationMatcher,
}

/// Evaluates whether a request is permitted by the enabled groups
///
/// A request is allowed when at least one enabled group matches both its
/// source address and its host. Disabled groups never contribute.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: Vec<GroupRule>,
}

impl AccessPolicy {
    /// Build a policy from groups, skipping disabled ones
    pub fn from_groups(groups: &[WhitelistGroup]) -> Result<Self> {
        let mut rules = Vec::new();

        for group in groups.iter().filter(|g| g.enabled) {
            let mut clients = ClientMatcher::new();
            for entry in &group.clients {
                let range = entry.network().ok_or_else(|| ValidationError::InvalidClient {
                    value: entry.value.clone(),
                })?;
                clients.add_range(range);
            }

            let mut destinations = DestinationMatcher::new();
            for entry in &group.destinations {
                destinations.add_pattern(&entry.value);
            }

            rules.push(GroupRule {
                name: group.name.clone(),
                clients,
                destinations,
            });
        }

        Ok(Self { rules })
    }

    /// Check if a request from `source` to `host` is allowed
    pub fn allow(&self, source: IpAddr, host: &str) -> bool {
        self.matching_group(source, host).is_some()
    }

    /// Name of the first group that permits the request
    pub fn matching_group(&self, source: IpAddr, host: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.clients.matches(source) && rule.destinations.matches(host))
            .map(|rule| rule.name.as_str())
    }

    /// Number of enabled groups contributing rules
    pub fn group_count(&self) -> usize {
        self.rules.len()
    }
}
