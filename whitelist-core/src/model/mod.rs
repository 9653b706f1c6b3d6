//! Whitelist group model and validation

pub mod schema;
pub mod validator;

pub use schema::{new_id, ClientEntry, DestinationEntry, WhitelistGroup};
pub use validator::GroupValidator;
