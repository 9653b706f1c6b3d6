//! Whitelist groups for an Nginx forward proxy, and their translation to and
//! from Nginx configuration text

pub mod error;
pub mod filter;
pub mod model;
pub mod parse;
pub mod render;
pub mod store;

// Re-export commonly used types
pub use error::{Result, ValidationError, WhitelistError};
pub use filter::{AccessPolicy, ClientMatcher, DestinationMatcher};
pub use model::{ClientEntry, DestinationEntry, GroupValidator, WhitelistGroup};
pub use parse::{reconcile_ids, ConfigParser, ParsedConfig, RuleState};
pub use render::{sanitize_token, ConfigGenerator, RuleScheme, Template};
pub use store::{GroupStore, MemoryGroupStore, TomlGroupStore};
