//! Identity provider integration.
//!
//! The identity provider owns credentials and sessions. This module exposes
//! it through the [`IdentityProvider`] trait so the gateway can be exercised
//! against an in-memory fake, and implements the trait for a GoTrue-style
//! REST API in [`IdentityClient`].
//!
//! # Session events
//!
//! Every implementation publishes [`AuthEvent`]s on a broadcast channel when
//! its session changes (sign-in, sign-out, token refresh, user update). The
//! session coordinator subscribes once at start-up.

mod client;
pub mod types;

pub use client::IdentityClient;
pub use types::{AuthChangeEvent, AuthEvent, ProviderSession, ProviderUser, SignUpOutcome};

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

use framecraft_core::Email;

/// Errors from the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a body we could not decode.
    #[error("invalid provider response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The provider refused the request; `message` is its own wording.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The operation needs a session and there is none.
    #[error("no active session")]
    NoSession,

    /// Client misconfiguration (bad base URL, unusable HTTP client).
    #[error("identity provider misconfigured: {0}")]
    Config(String),

    /// OAuth flow error (no pending authorization, bad callback).
    #[error("OAuth error: {0}")]
    OAuth(String),
}

impl IdentityError {
    /// Whether retrying the same request later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::Parse(_) | Self::NoSession | Self::Config(_) | Self::OAuth(_) => false,
        }
    }
}

/// External OAuth identity providers the storefront offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    Google,
    Apple,
    Facebook,
    Github,
}

impl OAuthProvider {
    /// Provider name as the identity provider expects it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
            Self::Facebook => "facebook",
            Self::Github => "github",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            "facebook" => Ok(Self::Facebook),
            "github" => Ok(Self::Github),
            other => Err(format!("unsupported OAuth provider: {other}")),
        }
    }
}

/// Which sessions a sign-out revokes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignOutScope {
    /// Only this client's session.
    #[default]
    Local,
    /// Every session of the user.
    Global,
}

impl SignOutScope {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
        }
    }
}

/// Remote identity provider: credentials, sessions and session events.
///
/// Implementations keep the current session themselves; callers never hand
/// tokens around.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Exchange email and password for a session. Emits `SignedIn`.
    fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> impl Future<Output = Result<ProviderSession, IdentityError>> + Send;

    /// Create a provider account. `metadata` is stored with the user.
    ///
    /// Emits `SignedIn` when the provider starts a session immediately.
    fn sign_up(
        &self,
        email: &Email,
        password: &str,
        metadata: serde_json::Value,
    ) -> impl Future<Output = Result<SignUpOutcome, IdentityError>> + Send;

    /// Begin an external OAuth sign-in, returning the URL to redirect to.
    fn authorize_url(
        &self,
        provider: OAuthProvider,
    ) -> impl Future<Output = Result<Url, IdentityError>> + Send;

    /// Finish an external sign-in with the callback code. Emits `SignedIn`.
    fn exchange_code_for_session(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<ProviderSession, IdentityError>> + Send;

    /// Revoke the session remotely. The local session is dropped and
    /// `SignedOut` emitted even when the remote call fails.
    fn sign_out(
        &self,
        scope: SignOutScope,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// The user behind the current session, `None` without a session.
    fn current_user(
        &self,
    ) -> impl Future<Output = Result<Option<ProviderUser>, IdentityError>> + Send;

    /// Send a password-reset email.
    fn request_password_reset(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Change the signed-in user's password. Emits `UserUpdated`.
    fn update_password(
        &self,
        password: &str,
    ) -> impl Future<Output = Result<ProviderUser, IdentityError>> + Send;

    /// Confirm an email address with the token from the verification mail.
    fn verify_email(&self, token: &str)
    -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Send the verification email again.
    fn resend_verification(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Subscribe to session-change events.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
