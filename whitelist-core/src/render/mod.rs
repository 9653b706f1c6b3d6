//! Rendering whitelist groups into Nginx configuration text

pub mod generator;
pub mod pattern;
pub mod scheme;
pub mod template;

pub use generator::{ConfigGenerator, RenderedRegions, DEFAULT_PAIR_WARNING_THRESHOLD};
pub use scheme::RuleScheme;
pub use template::Template;

/// Placeholder for http-context blocks (`map`/`geo`)
pub const MAPS_PLACEHOLDER: &str = "{{WHITELIST_MAPS}}";

/// Placeholder for server-context rules
pub const RULES_PLACEHOLDER: &str = "{{WHITELIST_RULES}}";

/// Common prefix of every placeholder token
pub const PLACEHOLDER_PREFIX: &str = "{{WHITELIST_";

/// Source values a `map` block reads as parameters unless escaped with `\`
pub const MAP_KEYWORDS: &[&str] = &["default", "hostnames", "include", "volatile"];

/// Comment prefix that opens a group
pub const GROUP_HEADER: &str = "# Group: ";

/// Comment prefix naming the scheme a rules region was rendered with
pub const SCHEME_HEADER: &str = "# Whitelist scheme: ";

/// Emitted in place of rules when no group is enabled
pub const EMPTY_MARKER: &str = "# No whitelist groups enabled";

/// Separator between client and destination in per-pair annotations
pub const PAIR_ARROW: &str = " -> ";

/// Variable holding the token of the group that admitted the request
pub const ALLOW_VAR: &str = "$wl_allowed";

/// Variable holding `"$remote_addr $host"` for the if-block scheme
pub const REQUEST_VAR: &str = "$wl_request";

pub const CLIENT_VAR_PREFIX: &str = "$wl_client_";
pub const DEST_VAR_PREFIX: &str = "$wl_dest_";
pub const GROUP_VAR_PREFIX: &str = "$wl_group_";

/// Turn a group id into a token usable inside Nginx variable names
///
/// Nginx variable names are case-insensitive, so the token is lowercased.
pub fn sanitize_token(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Source value for a `map` entry, escaped when it collides with a parameter
pub fn escape_map_key(key: &str) -> String {
    if MAP_KEYWORDS.contains(&key) {
        format!("\\{}", key)
    } else {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_map_key() {
        assert_eq!(escape_map_key("default"), "\\default");
        assert_eq!(escape_map_key("hostnames"), "\\hostnames");
        assert_eq!(escape_map_key("example.com"), "example.com");
        assert_eq!(escape_map_key("default.example.com"), "default.example.com");
    }

    #[test]
    fn test_sanitize_token() {
        assert_eq!(sanitize_token("office-1"), "office_1");
        assert_eq!(sanitize_token("Dev Team!"), "dev_team_");
        assert_eq!(sanitize_token("abc123"), "abc123");
        assert_eq!(sanitize_token("grüße"), "gr__e");
    }

    #[test]
    fn test_sanitize_collides_on_case_and_punctuation() {
        assert_eq!(sanitize_token("Team-A"), sanitize_token("team.a"));
    }
}
