//! Group validation

use super::schema::WhitelistGroup;
use crate::error::{Result, ValidationError};
use crate::render::PLACEHOLDER_PREFIX;
use std::collections::HashSet;

pub struct GroupValidator;

impl GroupValidator {
    /// Validate a full set of groups
    pub fn validate(groups: &[WhitelistGroup]) -> Result<()> {
        Self::check_unique_ids(groups)?;
        for group in groups {
            Self::validate_group(group)?;
        }
        Ok(())
    }

    /// Validate a single group's id, name and entries
    pub fn validate_group(group: &WhitelistGroup) -> Result<()> {
        if group.id.is_empty() {
            return Err(ValidationError::EmptyId {
                name: group.name.clone(),
            }
            .into());
        }

        if group.name.trim().is_empty() {
            return Err(ValidationError::EmptyName {
                group: group.id.clone(),
            }
            .into());
        }

        if group.name.contains('\n') || group.name.contains('\r') {
            return Err(ValidationError::MultilineName {
                name: group.name.clone(),
            }
            .into());
        }

        // Headers are written and read back trimmed
        if group.name.trim() != group.name {
            return Err(ValidationError::PaddedName {
                name: group.name.clone(),
            }
            .into());
        }

        // Headers land inside the template before the second substitution
        if group.name.contains(PLACEHOLDER_PREFIX) {
            return Err(ValidationError::PlaceholderInName {
                name: group.name.clone(),
            }
            .into());
        }

        for client in &group.clients {
            Self::validate_client(&client.value)?;
        }

        for destination in &group.destinations {
            Self::validate_destination(&destination.value)?;
        }

        Ok(())
    }

    fn check_unique_ids(groups: &[WhitelistGroup]) -> Result<()> {
        let mut seen = HashSet::new();
        for group in groups {
            if !seen.insert(group.id.as_str()) {
                return Err(ValidationError::DuplicateId {
                    id: group.id.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// A client must be an IPv4/IPv6 address or CIDR block
    pub fn validate_client(value: &str) -> std::result::Result<(), ValidationError> {
        let entry = super::schema::ClientEntry::new(value);
        match entry.network() {
            Some(_) => Ok(()),
            None => Err(ValidationError::InvalidClient {
                value: value.to_string(),
            }),
        }
    }

    /// A destination is a hostname with at most a single leading `*` label
    pub fn validate_destination(value: &str) -> std::result::Result<(), ValidationError> {
        let invalid = |reason| ValidationError::InvalidDestination {
            value: value.to_string(),
            reason,
        };

        if value.trim().is_empty() {
            return Err(invalid("empty"));
        }

        if value.contains("://") {
            return Err(invalid("contains a URI scheme"));
        }

        if value.contains('/') {
            return Err(invalid("contains a path"));
        }

        if value.contains(':') {
            return Err(invalid("contains a port"));
        }

        let host = value.strip_prefix("*.").unwrap_or(value);
        if host.contains('*') {
            return Err(invalid("wildcard is only allowed as the whole first label"));
        }

        for label in host.split('.') {
            if label.is_empty() {
                return Err(invalid("empty label"));
            }
            if !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(invalid("invalid character"));
            }
        }

        Ok(())
    }
}
