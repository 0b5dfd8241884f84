//! Domain models for the storefront identity layer.
//!
//! These types are validated domain objects, separate from database rows
//! (`db::profiles`) and identity provider wire types (`identity::types`).

pub mod business;
pub mod identity;
pub mod session;

pub use business::{BusinessAddress, BusinessPartnerProfile, NewBusinessProfile};
pub use identity::{AuthenticatedIdentity, NewProfile, ProfileUpdate};
pub use session::{SessionPhase, SessionSnapshot};
