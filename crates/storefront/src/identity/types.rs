//! Identity provider wire types and session-change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use framecraft_core::IdentityId;

/// A user as the identity provider sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: IdentityId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phone_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
    /// Free-form metadata supplied at sign-up (name, phone, intended role).
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl ProviderUser {
    /// Whether the provider has confirmed the email address.
    #[must_use]
    pub const fn email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    /// Whether the provider has confirmed the phone number.
    #[must_use]
    pub const fn phone_confirmed(&self) -> bool {
        self.phone_confirmed_at.is_some()
    }
}

/// An authenticated session issued by the identity provider.
///
/// Implements `Debug` manually to redact tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Absolute expiry as a Unix timestamp, when the provider sends one.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: ProviderUser,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

impl ProviderSession {
    /// Stamp an absolute expiry if the provider only sent a relative one.
    #[must_use]
    pub fn anchored(mut self, now: DateTime<Utc>) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(now.timestamp() + self.expires_in);
        }
        self
    }

    /// Whether the access token expires within `margin_secs` of `now`.
    ///
    /// Sessions without an absolute expiry are treated as expiring.
    #[must_use]
    pub fn expires_within(&self, margin_secs: i64, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_none_or(|at| at - now.timestamp() <= margin_secs)
    }
}

/// Result of a sign-up request.
///
/// `session` is absent when the provider requires email confirmation first.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: ProviderUser,
    pub session: Option<ProviderSession>,
}

/// Sign-up responses are either a full session or a bare user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SignUpResponse {
    Session(ProviderSession),
    User(ProviderUser),
}

impl From<SignUpResponse> for SignUpOutcome {
    fn from(response: SignUpResponse) -> Self {
        match response {
            SignUpResponse::Session(session) => Self {
                user: session.user.clone(),
                session: Some(session),
            },
            SignUpResponse::User(user) => Self {
                user,
                session: None,
            },
        }
    }
}

/// Error body returned by the identity provider.
///
/// Different endpoints use different field names for the message.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .filter(|m| !m.is_empty())
    }
}

/// Kind of session change announced by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// A session-change notification.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthChangeEvent,
    pub session: Option<ProviderSession>,
}

impl AuthEvent {
    #[must_use]
    pub const fn new(kind: AuthChangeEvent, session: Option<ProviderSession>) -> Self {
        Self { kind, session }
    }
}
