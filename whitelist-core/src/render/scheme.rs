//! Rule schemes: the textual encodings of group logic

use super::{MAPS_PLACEHOLDER, RULES_PLACEHOLDER};
use serde::{Deserialize, Serialize};

/// How group logic is expressed in configuration text
///
/// Only one scheme is live for a given configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleScheme {
    /// One `if` per client × destination pair, keyed by the group token
    #[default]
    IfBlock,
    /// Per-group `map` blocks for clients and hosts, ANDed by a combining map.
    /// Clients must be single addresses.
    MapBlock,
    /// Like `MapBlock`, but clients are matched by a `geo` block and may be CIDR
    GeoBlock,
}

impl RuleScheme {
    pub const ALL: [RuleScheme; 3] = [RuleScheme::IfBlock, RuleScheme::MapBlock, RuleScheme::GeoBlock];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleScheme::IfBlock => "if-block",
            RuleScheme::MapBlock => "map-block",
            RuleScheme::GeoBlock => "geo-block",
        }
    }

    /// Placeholders the template must contain for this scheme
    pub fn required_placeholders(&self) -> &'static [&'static str] {
        match self {
            RuleScheme::IfBlock => &[RULES_PLACEHOLDER],
            RuleScheme::MapBlock | RuleScheme::GeoBlock => &[MAPS_PLACEHOLDER, RULES_PLACEHOLDER],
        }
    }

    /// Whether the scheme declares per-group variables in the http context
    pub fn uses_variable_blocks(&self) -> bool {
        !matches!(self, RuleScheme::IfBlock)
    }

    /// Directive that opens a client block
    pub fn client_block_directive(&self) -> Option<&'static str> {
        match self {
            RuleScheme::IfBlock => None,
            RuleScheme::MapBlock => Some("map"),
            RuleScheme::GeoBlock => Some("geo"),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scheme| scheme.as_str() == s.trim())
    }
}

impl std::fmt::Display for RuleScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("Invalid rule scheme: {}. Use 'if-block', 'map-block', or 'geo-block'", s)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for scheme in RuleScheme::ALL {
            assert_eq!(RuleScheme::parse(scheme.as_str()), Some(scheme));
            assert_eq!(scheme.to_string().parse::<RuleScheme>(), Ok(scheme));
        }
        assert!("if".parse::<RuleScheme>().is_err());
    }

    #[test]
    fn test_required_placeholders() {
        assert_eq!(RuleScheme::IfBlock.required_placeholders(), &[RULES_PLACEHOLDER]);
        assert_eq!(RuleScheme::GeoBlock.required_placeholders().len(), 2);
    }

    #[test]
    fn test_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            scheme: RuleScheme,
        }
        let w: Wrapper = toml::from_str(r#"scheme = "geo-block""#).unwrap();
        assert_eq!(w.scheme, RuleScheme::GeoBlock);
    }
}
