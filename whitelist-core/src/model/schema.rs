//! Whitelist group types

use crate::render::sanitize_token;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Generate a fresh identifier for a group or entry
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A request source permitted by a group: an address or a CIDR block
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientEntry {
    #[serde(default = "new_id")]
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
}

impl ClientEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            value: value.into(),
            description: String::new(),
        }
    }

    /// The network this entry covers. A bare address is a single-host network.
    pub fn network(&self) -> Option<IpNet> {
        let value = self.value.trim();
        if let Ok(net) = value.parse::<IpNet>() {
            return Some(net.trunc());
        }
        value.parse::<IpAddr>().ok().map(IpNet::from)
    }

    /// Whether the entry covers exactly one address
    pub fn is_single_host(&self) -> bool {
        self.network()
            .map(|net| net.prefix_len() == net.max_prefix_len())
            .unwrap_or(false)
    }
}

/// A request target permitted by a group: a hostname, optionally `*.`-prefixed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DestinationEntry {
    #[serde(default = "new_id")]
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
}

impl DestinationEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            value: value.into(),
            description: String::new(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.value.starts_with("*.")
    }
}

fn default_true() -> bool {
    true
}

/// A named pairing of client and destination sets
///
/// A request is permitted by the group when its source matches any client
/// and its host matches any destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WhitelistGroup {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub clients: Vec<ClientEntry>,
    #[serde(default)]
    pub destinations: Vec<DestinationEntry>,
}

impl WhitelistGroup {
    /// Create an empty, enabled group with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(new_id(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            clients: Vec::new(),
            destinations: Vec::new(),
        }
    }

    /// Rule token used to key this group's fragments in generated text
    pub fn token(&self) -> String {
        sanitize_token(&self.id)
    }

    /// Add a client and return its id
    pub fn add_client(&mut self, value: impl Into<String>) -> String {
        let entry = ClientEntry::new(value);
        let id = entry.id.clone();
        self.clients.push(entry);
        id
    }

    /// Remove a client by id, returning whether it was present
    pub fn remove_client(&mut self, id: &str) -> bool {
        let before = self.clients.len();
        self.clients.retain(|c| c.id != id);
        self.clients.len() != before
    }

    /// Add a destination and return its id
    pub fn add_destination(&mut self, value: impl Into<String>) -> String {
        let entry = DestinationEntry::new(value);
        let id = entry.id.clone();
        self.destinations.push(entry);
        id
    }

    /// Remove a destination by id, returning whether it was present
    pub fn remove_destination(&mut self, id: &str) -> bool {
        let before = self.destinations.len();
        self.destinations.retain(|d| d.id != id);
        self.destinations.len() != before
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Distinct client values in first-seen order
    pub fn client_values(&self) -> Vec<&str> {
        dedup(self.clients.iter().map(|c| c.value.trim()))
    }

    /// First entry for each distinct client value
    pub fn clients_deduped(&self) -> Vec<&ClientEntry> {
        let mut out: Vec<&ClientEntry> = Vec::new();
        for client in &self.clients {
            if !out.iter().any(|c| c.value.trim() == client.value.trim()) {
                out.push(client);
            }
        }
        out
    }

    /// Distinct destination values in first-seen order, compared case-insensitively
    pub fn destination_values(&self) -> Vec<&str> {
        let mut seen = Vec::<String>::new();
        let mut out = Vec::new();
        for value in self.destinations.iter().map(|d| d.value.trim()) {
            let key = value.to_ascii_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                out.push(value);
            }
        }
        out
    }
}

fn dedup<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
