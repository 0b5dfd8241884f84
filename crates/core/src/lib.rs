//! Framecraft Core - Shared identity types.
//!
//! This crate provides the types shared by every Framecraft component:
//! - `storefront` - Identity gateway and session coordinator
//! - `cli` - Command-line tools for migrations and partner management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Identity IDs, emails, roles and approval statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
