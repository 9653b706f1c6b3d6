//! In-process evaluation of the access decision encoded by whitelist groups

pub mod matcher;
pub mod policy;

pub use matcher::{ClientMatcher, DestinationMatcher};
pub use policy::AccessPolicy;
