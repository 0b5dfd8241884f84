//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - The identity gateway: sign-in, registration, password and
//!   verification flows, business partner approval, role predicates and local
//!   form validation

pub mod auth;
