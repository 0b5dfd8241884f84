//! Identity domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use framecraft_core::{Email, IdentityId, UserRole};

/// The currently signed-in principal (domain type).
///
/// Built from the `storefront.profile` row, with the email-verified flag
/// reconciled against the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    /// Identity ID issued by the identity provider.
    pub id: IdentityId,
    /// Unique email address.
    pub email: Email,
    /// Display name.
    pub full_name: Option<String>,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Role; `individual_customer` unless set otherwise.
    pub role: UserRole,
    /// Whether the account may sign in.
    pub is_active: bool,
    /// Whether the email address has been confirmed.
    pub email_verified: bool,
    /// Whether the phone number has been confirmed.
    pub phone_verified: bool,
    /// Avatar image reference.
    pub avatar_url: Option<String>,
    /// Stamped on every successful password or OAuth sign-in.
    pub last_login_at: Option<DateTime<Utc>>,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
    /// When the profile was last updated.
    pub updated_at: DateTime<Utc>,
}

impl AuthenticatedIdentity {
    /// Name to greet the user with, falling back to the email local part.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.email.local_part())
    }
}

/// Profile row to insert after the provider account exists.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: IdentityId,
    pub email: Email,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub email_verified: bool,
}

/// Partial profile update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    /// Whether the update would change nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.phone.is_none() && self.avatar_url.is_none()
    }
}
