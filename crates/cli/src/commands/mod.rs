//! CLI command implementations.

pub mod auth;
pub mod context;
pub mod migrate;
pub mod partner;
