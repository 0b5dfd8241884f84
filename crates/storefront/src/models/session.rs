//! Session snapshot types.
//!
//! The [`SessionSnapshot`] is the single view of "who is signed in" that the
//! rest of the application reads. Only `SessionCoordinator` mutates it;
//! everyone else gets clones or a `watch::Receiver`.

use serde::{Deserialize, Serialize};

use framecraft_core::UserRole;

use super::{AuthenticatedIdentity, BusinessPartnerProfile};
use crate::services::auth::roles;

/// Coarse lifecycle phase derived from a snapshot.
///
/// The error message is an overlay, not a phase: it can coexist with either
/// settled phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// The first initialization has not completed.
    Uninitialized,
    /// A transition is in flight.
    Loading,
    /// A principal is signed in.
    Authenticated,
    /// Nobody is signed in.
    Unauthenticated,
}

/// Current authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The signed-in principal, if any.
    pub identity: Option<AuthenticatedIdentity>,
    /// The principal's business account, present only for business partners.
    pub business_profile: Option<BusinessPartnerProfile>,
    /// True while any coordinator transition is in flight, and at start-up.
    pub loading: bool,
    /// Human-readable message from the last failed transition.
    pub error: Option<String>,
    /// Whether the start-up transition has completed at least once.
    pub initialized: bool,
    /// Ticket of the last transition whose result was committed.
    pub revision: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            identity: None,
            business_profile: None,
            loading: true,
            error: None,
            initialized: false,
            revision: 0,
        }
    }
}

impl SessionSnapshot {
    /// True iff a principal is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Lifecycle phase of this snapshot.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        if !self.initialized {
            SessionPhase::Uninitialized
        } else if self.loading {
            SessionPhase::Loading
        } else if self.identity.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }

    /// Role of the signed-in principal.
    #[must_use]
    pub fn role(&self) -> Option<UserRole> {
        self.identity.as_ref().map(|i| i.role)
    }

    #[must_use]
    pub fn has_role(&self, role: UserRole) -> bool {
        roles::has_role(self.identity.as_ref(), role)
    }

    #[must_use]
    pub fn has_any_role(&self, wanted: &[UserRole]) -> bool {
        roles::has_any_role(self.identity.as_ref(), wanted)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        roles::is_admin(self.identity.as_ref())
    }

    #[must_use]
    pub fn is_business_partner(&self) -> bool {
        roles::is_business_partner(self.identity.as_ref())
    }

    #[must_use]
    pub fn is_individual_customer(&self) -> bool {
        roles::is_individual_customer(self.identity.as_ref())
    }

    /// Whether wholesale pricing may be shown.
    #[must_use]
    pub fn can_view_partner_pricing(&self) -> bool {
        roles::can_view_partner_pricing(self.identity.as_ref(), self.business_profile.as_ref())
    }

    /// Drop the principal and business profile.
    pub(crate) fn clear_principal(&mut self) {
        self.identity = None;
        self.business_profile = None;
    }
}
