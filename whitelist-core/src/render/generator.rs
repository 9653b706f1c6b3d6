//! Rendering groups into configuration text

use super::pattern::{client_regex, host_regex};
use super::scheme::RuleScheme;
use super::template::Template;
use super::{
    escape_map_key, ALLOW_VAR, CLIENT_VAR_PREFIX, DEST_VAR_PREFIX, EMPTY_MARKER, GROUP_HEADER,
    GROUP_VAR_PREFIX, MAPS_PLACEHOLDER, PAIR_ARROW, REQUEST_VAR, RULES_PLACEHOLDER, SCHEME_HEADER,
};
use crate::error::{Result, WhitelistError};
use crate::model::{GroupValidator, WhitelistGroup};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Groups with more pairs than this are reported when rendered per pair
pub const DEFAULT_PAIR_WARNING_THRESHOLD: usize = 500;

/// Lines for the http-context and server-context regions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedRegions {
    pub maps: Vec<String>,
    pub rules: Vec<String>,
}

/// Renders whitelist groups into Nginx configuration using one rule scheme
///
/// Generation is pure: the same groups in the same order always produce the
/// same text.
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    scheme: RuleScheme,
    pair_warning_threshold: usize,
}

impl Default for ConfigGenerator {
    fn default() -> Self {
        Self::new(RuleScheme::default())
    }
}

impl ConfigGenerator {
    pub fn new(scheme: RuleScheme) -> Self {
        Self {
            scheme,
            pair_warning_threshold: DEFAULT_PAIR_WARNING_THRESHOLD,
        }
    }

    pub fn with_pair_warning_threshold(mut self, threshold: usize) -> Self {
        self.pair_warning_threshold = threshold;
        self
    }

    pub fn scheme(&self) -> RuleScheme {
        self.scheme
    }

    /// Render `groups` into `template`
    ///
    /// Fails when the template lacks a placeholder the scheme needs, when two
    /// enabled groups share a rule token, or when a group is invalid.
    pub fn generate(&self, groups: &[WhitelistGroup], template: &str) -> Result<String> {
        let mut template = Template::new(template);

        for placeholder in self.scheme.required_placeholders() {
            if !template.contains(placeholder) {
                return Err(WhitelistError::TemplateContract {
                    placeholder: placeholder.to_string(),
                    scheme: self.scheme.to_string(),
                });
            }
        }

        let regions = self.render_regions(groups)?;
        template.substitute(MAPS_PLACEHOLDER, &regions.maps);
        template.substitute(RULES_PLACEHOLDER, &regions.rules);

        Ok(template.into_string())
    }

    /// Render the two placeholder regions without a template
    pub fn render_regions(&self, groups: &[WhitelistGroup]) -> Result<RenderedRegions> {
        let enabled: Vec<&WhitelistGroup> = groups.iter().filter(|g| g.enabled).collect();
        for group in &enabled {
            GroupValidator::validate_group(group)?;
        }
        check_tokens(&enabled)?;

        debug!(
            scheme = %self.scheme,
            enabled = enabled.len(),
            total = groups.len(),
            "Rendering whitelist groups"
        );

        let mut rules = vec![
            format!("{}{}", SCHEME_HEADER, self.scheme),
        ];

        if enabled.is_empty() {
            rules.push(EMPTY_MARKER.to_string());
            rules.push(format!("set {} \"\";", ALLOW_VAR));
            let maps = if self.scheme.uses_variable_blocks() {
                vec![EMPTY_MARKER.to_string()]
            } else {
                vec![self.unused_maps_comment()]
            };
            return Ok(RenderedRegions { maps, rules });
        }

        rules.push(format!("set {} \"\";", ALLOW_VAR));

        match self.scheme {
            RuleScheme::IfBlock => {
                rules.push(format!("set {} \"$remote_addr $host\";", REQUEST_VAR));
                for group in &enabled {
                    rules.push(String::new());
                    rules.extend(self.render_pairs(group)?);
                }
                Ok(RenderedRegions {
                    maps: vec![self.unused_maps_comment()],
                    rules,
                })
            }
            RuleScheme::MapBlock | RuleScheme::GeoBlock => {
                let mut maps = Vec::new();
                for (i, group) in enabled.iter().enumerate() {
                    if i > 0 {
                        maps.push(String::new());
                    }
                    maps.extend(self.render_variable_blocks(group)?);
                    let token = group.token();
                    rules.push(format!(
                        "if ({}{}) {{ set {} {}; }}",
                        GROUP_VAR_PREFIX, token, ALLOW_VAR, token
                    ));
                }
                Ok(RenderedRegions { maps, rules })
            }
        }
    }

    fn unused_maps_comment(&self) -> String {
        format!("# Whitelist maps: not used by the {} scheme", self.scheme)
    }

    /// One conditional per client × destination pair
    fn render_pairs(&self, group: &WhitelistGroup) -> Result<Vec<String>> {
        let clients = group.client_values();
        let destinations = group.destination_values();
        let pairs = clients.len() * destinations.len();
        if pairs > self.pair_warning_threshold {
            warn!(
                group = %group.name,
                clients = clients.len(),
                destinations = destinations.len(),
                pairs,
                "Group renders {} per-pair rules; consider the geo-block scheme",
                pairs
            );
        }

        let token = group.token();
        let mut lines = Vec::with_capacity(pairs + 1);
        lines.push(format!("{}{}", GROUP_HEADER, group.name.trim()));

        for client in &group.clients_deduped() {
            let net = client.network().ok_or_else(|| WhitelistError::UnsupportedClient {
                group: group.name.clone(),
                value: client.value.clone(),
                scheme: self.scheme.to_string(),
            })?;
            let client_re = client_regex(&net).ok_or_else(|| WhitelistError::UnsupportedClient {
                group: group.name.clone(),
                value: client.value.clone(),
                scheme: self.scheme.to_string(),
            })?;

            for destination in &destinations {
                lines.push(format!(
                    "if ({} ~* \"^{} {}$\") {{ set {} {}; }} # {}{}{}",
                    REQUEST_VAR,
                    client_re,
                    host_regex(destination),
                    ALLOW_VAR,
                    token,
                    client.value.trim(),
                    PAIR_ARROW,
                    destination
                ));
            }
        }

        Ok(lines)
    }

    /// Client block, destination block and the map that ANDs them
    fn render_variable_blocks(&self, group: &WhitelistGroup) -> Result<Vec<String>> {
        let token = group.token();
        let mut lines = vec![format!("{}{}", GROUP_HEADER, group.name.trim())];

        let directive = self.scheme.client_block_directive().unwrap_or("geo");
        lines.push(format!(
            "{} $remote_addr {}{} {{",
            directive, CLIENT_VAR_PREFIX, token
        ));
        lines.push("    default 0;".to_string());
        for client in &group.clients_deduped() {
            let key = match self.scheme {
                RuleScheme::MapBlock => {
                    match client.network().filter(|_| client.is_single_host()) {
                        Some(net) => net.addr().to_string(),
                        None => {
                            return Err(WhitelistError::UnsupportedClient {
                                group: group.name.clone(),
                                value: client.value.clone(),
                                scheme: self.scheme.to_string(),
                            })
                        }
                    }
                }
                _ => client.value.trim().to_string(),
            };
            lines.push(format!("    {} 1;", key));
        }
        lines.push("}".to_string());

        lines.push(format!("map $host {}{} {{", DEST_VAR_PREFIX, token));
        lines.push("    hostnames;".to_string());
        lines.push("    default 0;".to_string());
        for destination in group.destination_values() {
            lines.push(format!(
                "    {} 1;",
                escape_map_key(&destination.to_ascii_lowercase())
            ));
        }
        lines.push("}".to_string());

        lines.push(format!(
            "map \"{}{}{}{}\" {}{} {{",
            CLIENT_VAR_PREFIX, token, DEST_VAR_PREFIX, token, GROUP_VAR_PREFIX, token
        ));
        lines.push("    default 0;".to_string());
        lines.push("    11 1;".to_string());
        lines.push("}".to_string());

        Ok(lines)
    }
}

/// Fail when two enabled groups would share a rule token
fn check_tokens(groups: &[&WhitelistGroup]) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for group in groups {
        let token = group.token();
        if let Some(first) = seen.insert(token.clone(), group.id.as_str()) {
            return Err(WhitelistError::IdCollision {
                token,
                first: first.to_string(),
                second: group.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::render::Template;

    const TEMPLATE: &str = "http {\n    {{WHITELIST_MAPS}}\n    server {\n        {{WHITELIST_RULES}}\n    }\n}\n";

    fn group(id: &str, name: &str, clients: &[&str], destinations: &[&str]) -> WhitelistGroup {
        let mut g = WhitelistGroup::with_id(id, name);
        for c in clients {
            g.add_client(*c);
        }
        for d in destinations {
            g.add_destination(*d);
        }
        g
    }

    fn fragment_count(text: &str) -> usize {
        text.lines()
            .filter(|l| l.trim_start().starts_with("if ($wl_request"))
            .count()
    }

    #[test]
    fn test_cartesian_fragment_count() {
        let groups = vec![group(
            "office",
            "Office",
            &["10.0.0.1", "10.0.0.2", "10.0.1.0/24"],
            &["a.example.com", "*.example.org"],
        )];
        let out = ConfigGenerator::default().generate(&groups, TEMPLATE).unwrap();
        assert_eq!(fragment_count(&out), 6);
        assert!(out.contains("# Group: Office"));
    }

    #[test]
    fn test_duplicate_values_rendered_once() {
        let groups = vec![group(
            "g",
            "G",
            &["10.0.0.1", "10.0.0.1"],
            &["example.com", "EXAMPLE.com"],
        )];
        let out = ConfigGenerator::default().generate(&groups, TEMPLATE).unwrap();
        assert_eq!(fragment_count(&out), 1);
    }

    #[test]
    fn test_pair_line_shape() {
        let groups = vec![group("office-1", "Office", &["10.0.0.5"], &["*.example.com"])];
        let out = ConfigGenerator::default().generate(&groups, TEMPLATE).unwrap();
        assert!(out.contains(
            r#"        if ($wl_request ~* "^10\.0\.0\.5 [^ ]+\.example\.com$") { set $wl_allowed office_1; } # 10.0.0.5 -> *.example.com"#
        ));
        assert!(out.contains("        set $wl_allowed \"\";"));
        assert!(out.contains("# Whitelist maps: not used by the if-block scheme"));
    }

    #[test]
    fn test_disabled_groups_vanish() {
        let mut g = group("hidden", "Hidden", &["10.0.0.1"], &["example.com"]);
        g.set_enabled(false);
        let out = ConfigGenerator::default().generate(&[g], TEMPLATE).unwrap();
        assert!(out.contains(EMPTY_MARKER));
        assert!(!out.contains("hidden"));
        assert!(!out.contains("Hidden"));
    }

    #[test]
    fn test_missing_placeholder_is_an_error() {
        let groups = vec![group("g", "G", &["10.0.0.1"], &["example.com"])];
        let result = ConfigGenerator::default().generate(&groups, "server { }");
        assert!(matches!(result, Err(WhitelistError::TemplateContract { .. })));

        let result = ConfigGenerator::new(RuleScheme::GeoBlock)
            .generate(&groups, "server { {{WHITELIST_RULES}} }");
        assert!(matches!(
            result,
            Err(WhitelistError::TemplateContract { placeholder, .. }) if placeholder == MAPS_PLACEHOLDER
        ));
    }

    #[test]
    fn test_missing_placeholder_checked_even_when_empty() {
        let result = ConfigGenerator::default().generate(&[], "no placeholders here");
        assert!(matches!(result, Err(WhitelistError::TemplateContract { .. })));
    }

    #[test]
    fn test_token_collision() {
        let groups = vec![
            group("team-a", "A", &["10.0.0.1"], &["a.com"]),
            group("team.a", "B", &["10.0.0.2"], &["b.com"]),
        ];
        let result = ConfigGenerator::default().generate(&groups, TEMPLATE);
        assert!(matches!(result, Err(WhitelistError::IdCollision { token, .. }) if token == "team_a"));
    }

    #[test]
    fn test_collision_ignores_disabled_groups() {
        let mut b = group("team.a", "B", &["10.0.0.2"], &["b.com"]);
        b.set_enabled(false);
        let groups = vec![group("team-a", "A", &["10.0.0.1"], &["a.com"]), b];
        assert!(ConfigGenerator::default().generate(&groups, TEMPLATE).is_ok());
    }

    #[test]
    fn test_idempotent() {
        let groups = vec![
            group("a", "A", &["10.0.0.1", "10.0.0.0/30"], &["a.com", "*.b.com"]),
            group("b", "B", &["2001:db8::1"], &["c.org"]),
        ];
        for scheme in [RuleScheme::IfBlock, RuleScheme::GeoBlock] {
            let generator = ConfigGenerator::new(scheme);
            let first = generator.generate(&groups, TEMPLATE).unwrap();
            let second = generator.generate(&groups, TEMPLATE).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_ipv6_cidr_unsupported_per_pair() {
        let groups = vec![group("v6", "V6", &["2001:db8::/32"], &["example.com"])];
        let result = ConfigGenerator::default().generate(&groups, TEMPLATE);
        assert!(matches!(result, Err(WhitelistError::UnsupportedClient { .. })));

        let out = ConfigGenerator::new(RuleScheme::GeoBlock).generate(&groups, TEMPLATE);
        assert!(out.is_ok());
    }

    #[test]
    fn test_geo_blocks() {
        let groups = vec![group("lan", "LAN", &["192.168.0.0/16"], &["*.corp.net", "Corp.net"])];
        let out = ConfigGenerator::new(RuleScheme::GeoBlock)
            .generate(&groups, TEMPLATE)
            .unwrap();

        assert!(out.contains("    geo $remote_addr $wl_client_lan {"));
        assert!(out.contains("        192.168.0.0/16 1;"));
        assert!(out.contains("    map $host $wl_dest_lan {"));
        assert!(out.contains("        hostnames;"));
        assert!(out.contains("        *.corp.net 1;"));
        assert!(out.contains("        corp.net 1;"));
        assert!(out.contains("    map \"$wl_client_lan$wl_dest_lan\" $wl_group_lan {"));
        assert!(out.contains("        if ($wl_group_lan) { set $wl_allowed lan; }"));
        assert!(out.contains("# Whitelist scheme: geo-block"));
    }

    #[test]
    fn test_map_block_requires_single_hosts() {
        let ok = vec![group("m", "M", &["10.0.0.9/32"], &["example.com"])];
        let out = ConfigGenerator::new(RuleScheme::MapBlock)
            .generate(&ok, TEMPLATE)
            .unwrap();
        assert!(out.contains("    map $remote_addr $wl_client_m {"));
        assert!(out.contains("        10.0.0.9 1;"));

        let wide = vec![group("m", "M", &["10.0.0.0/8"], &["example.com"])];
        assert!(matches!(
            ConfigGenerator::new(RuleScheme::MapBlock).generate(&wide, TEMPLATE),
            Err(WhitelistError::UnsupportedClient { .. })
        ));
    }

    #[test]
    fn test_empty_marker_in_both_regions_for_variable_schemes() {
        let out = ConfigGenerator::new(RuleScheme::MapBlock)
            .generate(&[], TEMPLATE)
            .unwrap();
        assert_eq!(out.matches(EMPTY_MARKER).count(), 2);
        assert!(!Template::new(out).has_placeholders());
    }

    #[test]
    fn test_reserved_destination_escaped() {
        let groups = vec![group("m", "M", &["10.0.0.9"], &["default", "Hostnames", "example.com"])];
        let out = ConfigGenerator::new(RuleScheme::MapBlock)
            .generate(&groups, TEMPLATE)
            .unwrap();
        assert!(out.contains("        \\default 1;"));
        assert!(out.contains("        \\hostnames 1;"));
        assert!(out.contains("        example.com 1;"));
        assert_eq!(out.matches("    default 0;").count(), 3);
    }

    #[test]
    fn test_placeholder_name_rejected() {
        let groups = vec![group("x", "{{WHITELIST_RULES}}", &["10.0.0.1"], &["example.com"])];
        for scheme in [RuleScheme::IfBlock, RuleScheme::GeoBlock] {
            assert!(matches!(
                ConfigGenerator::new(scheme).generate(&groups, TEMPLATE),
                Err(WhitelistError::Validation(ValidationError::PlaceholderInName { .. }))
            ));
        }
    }

    #[test]
    fn test_empty_id_is_a_validation_error() {
        let groups = vec![group("", "Office", &["10.0.0.1"], &["example.com"])];
        assert!(matches!(
            ConfigGenerator::default().generate(&groups, TEMPLATE),
            Err(WhitelistError::Validation(ValidationError::EmptyId { .. }))
        ));
    }

    #[test]
    fn test_invalid_group_rejected() {
        let groups = vec![group("g", "G", &["10.0.0.1"], &["https://example.com"])];
        assert!(matches!(
            ConfigGenerator::default().generate(&groups, TEMPLATE),
            Err(WhitelistError::Validation(_))
        ));
    }
}
