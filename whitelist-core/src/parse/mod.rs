//! Recovering whitelist groups from configuration text

pub mod parser;
pub mod reconcile;

pub use parser::{ConfigParser, ParsedConfig, RuleState};
pub use reconcile::reconcile_ids;
