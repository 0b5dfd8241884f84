//! Framecraft storefront identity library.
//!
//! Everything the storefront needs to know about *who* is shopping lives here.
//! The crate is consumed by user-facing surfaces (the `fc-cli` binary, or any
//! embedding UI) and talks to two hosted collaborators: an identity provider
//! over HTTP and a `PostgreSQL` store holding profiles and business accounts.
//!
//! # Layers
//!
//! - [`identity`] - HTTP client for the identity provider (sessions, OAuth,
//!   password flows) and the session-change event stream
//! - [`db`] - Profile and business-account repository
//! - [`services::auth`] - The identity gateway: stateless operations plus
//!   role predicates and local form validation
//! - [`session`] - The session coordinator: the single owner of the current
//!   [`models::SessionSnapshot`]
//!
//! ```text
//! caller ──► SessionCoordinator ──► AuthService ──► IdentityProvider (HTTP)
//!                  ▲                     └────────► ProfileStore (PostgreSQL)
//!                  └──── AuthEvent (signed in / signed out / token refreshed)
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod session;

pub use services::auth::{AuthError, AuthService};
pub use session::SessionCoordinator;
