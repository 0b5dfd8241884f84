//! Core types for Framecraft.
//!
//! This module provides type-safe wrappers for identity concepts.

pub mod email;
pub mod id;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use status::*;
