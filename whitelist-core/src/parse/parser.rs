//! Line-oriented parser for generated whitelist configuration
//!
//! Parsing is best-effort and never fails. A malformed group (a header with no
//! destination block, an unterminated block) yields a partial group and does
//! not affect its neighbours.
//!
//! Ids are synthetic: a timestamp and random suffix shared by one call, so
//! they are stable within a parse but not across parses. Use
//! [`reconcile_ids`](super::reconcile_ids) to restore known ids by name.

use crate::model::{ClientEntry, DestinationEntry, WhitelistGroup};
use crate::render::{
    RuleScheme, ALLOW_VAR, CLIENT_VAR_PREFIX, DEST_VAR_PREFIX, EMPTY_MARKER, GROUP_HEADER,
    GROUP_VAR_PREFIX, MAPS_PLACEHOLDER, PAIR_ARROW, REQUEST_VAR, RULES_PLACEHOLDER, SCHEME_HEADER,
};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

/// What the whitelist regions of a configuration contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleState {
    /// At least one group was rendered
    Generated,
    /// The generator ran with no enabled groups
    Empty,
    /// A placeholder token was never substituted
    Unsubstituted,
    /// No whitelist markers at all
    Absent,
}

/// Result of inspecting configuration text
#[derive(Debug, Clone)]
pub struct ParsedConfig {
    pub groups: Vec<WhitelistGroup>,
    pub scheme: Option<RuleScheme>,
    pub state: RuleState,
}

pub struct ConfigParser;

impl ConfigParser {
    /// Extract groups from configuration text
    pub fn parse(text: &str) -> Vec<WhitelistGroup> {
        Self::inspect(text).groups
    }

    /// Extract groups, the scheme in use, and whether the regions were rendered
    pub fn inspect(text: &str) -> ParsedConfig {
        let mut state = ParseState::new();

        for (lineno, line) in text.lines().enumerate() {
            state.feed(lineno + 1, line.trim());
        }

        state.finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Block {
    Client(usize),
    Destination(usize),
    Skip,
}

struct Builder {
    group: WhitelistGroup,
    token: Option<String>,
}

struct ParseState {
    id_base: String,
    groups: Vec<Builder>,
    current: Option<usize>,
    block: Option<Block>,
    scheme: Option<RuleScheme>,
    saw_empty_marker: bool,
    saw_placeholder: bool,
}

impl ParseState {
    fn new() -> Self {
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self {
            id_base: format!("parsed-{}-{}", Utc::now().timestamp_millis(), suffix),
            groups: Vec::new(),
            current: None,
            block: None,
            scheme: None,
            saw_empty_marker: false,
            saw_placeholder: false,
        }
    }

    fn feed(&mut self, lineno: usize, line: &str) {
        if line.contains(MAPS_PLACEHOLDER) || line.contains(RULES_PLACEHOLDER) {
            self.saw_placeholder = true;
        }

        if let Some(name) = line.strip_prefix(GROUP_HEADER.trim_end()) {
            if let Some(block) = self.block.take() {
                debug!(lineno, ?block, "Block not closed before next group header");
            }
            self.open_group(name.trim(), None);
            return;
        }

        if let Some(block) = self.block {
            if line.starts_with('}') {
                self.block = None;
            } else {
                self.block_entry(block, line);
            }
            return;
        }

        if let Some(name) = line.strip_prefix(SCHEME_HEADER.trim_end()) {
            match RuleScheme::parse(name) {
                Some(scheme) => self.scheme = Some(scheme),
                None => debug!(lineno, name = name.trim(), "Unknown rule scheme header"),
            }
            return;
        }

        if line.starts_with(EMPTY_MARKER) {
            self.saw_empty_marker = true;
            return;
        }

        if line.starts_with("if (") && line.contains(REQUEST_VAR) {
            self.pair_line(lineno, line);
            return;
        }

        if (line.starts_with("map ") || line.starts_with("geo ")) && line.ends_with('{') {
            self.open_block(line);
        }
    }

    fn open_group(&mut self, name: &str, token: Option<String>) -> usize {
        let index = self.groups.len();
        let name = if name.is_empty() { "unnamed" } else { name };
        let group = WhitelistGroup::with_id(format!("{}-{}", self.id_base, index), name);
        self.groups.push(Builder { group, token });
        self.current = Some(index);
        index
    }

    /// Group that owns `token`: the open group if it has no token yet, else the
    /// group that claimed it, else a new group named after the token
    fn group_for_token(&mut self, token: &str) -> usize {
        if let Some(index) = self.current {
            let builder = &mut self.groups[index];
            match &builder.token {
                Some(t) if t == token => return index,
                None => {
                    builder.token = Some(token.to_string());
                    return index;
                }
                Some(_) => {}
            }
        }

        if let Some(index) = self
            .groups
            .iter()
            .position(|b| b.token.as_deref() == Some(token))
        {
            return index;
        }

        debug!(token, "Variable block without a group header");
        self.open_group(token, Some(token.to_string()))
    }

    /// `if ($wl_request ~* "...") { set $wl_allowed <token>; } # <client> -> <destination>`
    fn pair_line(&mut self, lineno: usize, line: &str) {
        if self.scheme.is_none() {
            self.scheme = Some(RuleScheme::IfBlock);
        }

        let Some((_, annotation)) = line.rsplit_once("} #") else {
            debug!(lineno, "Per-pair rule without annotation");
            return;
        };
        let Some((client, destination)) = annotation.trim().split_once(PAIR_ARROW.trim()) else {
            debug!(lineno, "Malformed per-pair annotation");
            return;
        };
        let (client, destination) = (client.trim(), destination.trim());
        if client.is_empty() || destination.is_empty() {
            debug!(lineno, "Empty value in per-pair annotation");
            return;
        }

        let index = match self.current {
            Some(index) => index,
            None => {
                let token = allowed_token(line).unwrap_or_else(|| "ungrouped".to_string());
                self.group_for_token(&token)
            }
        };

        let group = &mut self.groups[index].group;
        add_client(group, client);
        add_destination(group, destination);
    }

    /// `map|geo $remote_addr $wl_client_<token> {` and friends
    fn open_block(&mut self, line: &str) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            self.block = Some(Block::Skip);
            return;
        }
        let (directive, variable) = (parts[0], parts[2]);

        if let Some(token) = variable.strip_prefix(CLIENT_VAR_PREFIX) {
            if self.scheme.is_none() {
                self.scheme = Some(if directive == "geo" {
                    RuleScheme::GeoBlock
                } else {
                    RuleScheme::MapBlock
                });
            }
            let index = self.group_for_token(token);
            self.block = Some(Block::Client(index));
        } else if let Some(token) = variable.strip_prefix(DEST_VAR_PREFIX) {
            let index = self.group_for_token(token);
            self.block = Some(Block::Destination(index));
        } else {
            if !variable.starts_with(GROUP_VAR_PREFIX) {
                debug!(variable, "Skipping unrelated {} block", directive);
            }
            self.block = Some(Block::Skip);
        }
    }

    fn block_entry(&mut self, block: Block, line: &str) {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some(key) = line.trim_end_matches(';').split_whitespace().next() else {
            return;
        };
        // `\default` is a value, bare `default` is a parameter
        let value = if let Some(escaped) = key.strip_prefix('\\') {
            escaped
        } else if matches!(
            key,
            "default" | "hostnames" | "include" | "ranges" | "proxy" | "delete" | "volatile"
        ) {
            return;
        } else {
            key
        };
        let value = value.trim_matches('"');

        match block {
            Block::Client(index) => add_client(&mut self.groups[index].group, value),
            Block::Destination(index) => add_destination(&mut self.groups[index].group, value),
            Block::Skip => {}
        }
    }

    fn finish(mut self) -> ParsedConfig {
        if let Some(block) = self.block.take() {
            debug!(?block, "Block not closed at end of input");
        }

        let groups: Vec<WhitelistGroup> = self
            .groups
            .into_iter()
            .map(|b| assign_entry_ids(b.group))
            .collect();

        let state = if self.saw_placeholder {
            RuleState::Unsubstituted
        } else if !groups.is_empty() {
            RuleState::Generated
        } else if self.saw_empty_marker {
            RuleState::Empty
        } else if self.scheme.is_some() {
            RuleState::Generated
        } else {
            RuleState::Absent
        };

        debug!(groups = groups.len(), ?state, scheme = ?self.scheme, "Parsed whitelist configuration");

        ParsedConfig {
            groups,
            scheme: self.scheme,
            state,
        }
    }
}

/// Token in `set $wl_allowed <token>;`
fn allowed_token(line: &str) -> Option<String> {
    let start = line.find(ALLOW_VAR)? + ALLOW_VAR.len();
    let rest = &line[start..];
    let end = rest.find(';')?;
    let token = rest[..end].trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn add_client(group: &mut WhitelistGroup, value: &str) {
    if !group.clients.iter().any(|c| c.value == value) {
        group.clients.push(ClientEntry::new(value));
    }
}

fn add_destination(group: &mut WhitelistGroup, value: &str) {
    if !group
        .destinations
        .iter()
        .any(|d| d.value.eq_ignore_ascii_case(value))
    {
        group.destinations.push(DestinationEntry::new(value));
    }
}

/// Entry ids derived from the group id, so one parse is self-consistent
fn assign_entry_ids(mut group: WhitelistGroup) -> WhitelistGroup {
    for (i, client) in group.clients.iter_mut().enumerate() {
        client.id = format!("{}-c{}", group.id, i);
    }
    for (i, destination) in group.destinations.iter_mut().enumerate() {
        destination.id = format!("{}-d{}", group.id, i);
    }
    group
}
