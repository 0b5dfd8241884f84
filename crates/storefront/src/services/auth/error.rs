//! Authentication error types.

use std::fmt;

use thiserror::Error;

use framecraft_core::{ApprovalStatus, IdentityId};

use super::validation::ValidationErrors;
use crate::db::RepositoryError;
use crate::identity::IdentityError;

/// Step of a registration that failed after the provider account existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStage {
    /// Inserting the profile row.
    Profile,
    /// Inserting the business account row.
    BusinessAccount,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Profile => "profile",
            Self::BusinessAccount => "business account",
        })
    }
}

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider refused the request; the message is its own.
    #[error("{0}")]
    ProviderRejected(String),

    /// Local form validation failed. Nothing was sent anywhere.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] framecraft_core::EmailError),

    /// The operation needs a signed-in principal.
    #[error("not signed in")]
    NotAuthenticated,

    /// The provider knows the identity but there is no profile row.
    #[error("no profile exists for identity {0}")]
    ProfileNotFound(IdentityId),

    /// No business account for the given identity.
    #[error("no business account exists for identity {0}")]
    PartnerNotFound(IdentityId),

    /// The signed-in principal lacks the required role.
    #[error("this action requires an administrator")]
    Forbidden,

    /// Approval state change not allowed from the current status.
    #[error("cannot move a {from} business account to {to}")]
    InvalidTransition {
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    /// The provider account exists but a later insert failed. The identity is
    /// left in place for reconciliation.
    #[error("registration incomplete for identity {identity_id}: {stage} insert failed: {source}")]
    IncompleteRegistration {
        identity_id: IdentityId,
        stage: RegistrationStage,
        #[source]
        source: RepositoryError,
    },

    /// Transport or protocol failure talking to the identity provider.
    #[error("identity provider error: {0}")]
    Provider(IdentityError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<IdentityError> for AuthError {
    fn from(e: IdentityError) -> Self {
        // Rate limits and provider outages are not the user's doing.
        if e.is_transient() {
            return Self::Provider(e);
        }
        match e {
            IdentityError::Rejected { message, .. } => Self::ProviderRejected(message),
            IdentityError::NoSession => Self::NotAuthenticated,
            other => Self::Provider(other),
        }
    }
}

impl From<ValidationErrors> for AuthError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl AuthError {
    /// Text suitable for showing to the person at the keyboard.
    ///
    /// Infrastructure details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderRejected(message) => message.clone(),
            Self::Validation(errors) => errors.to_string(),
            Self::PasswordMismatch => "Passwords do not match".to_owned(),
            Self::InvalidEmail(e) => format!("Invalid email address: {e}"),
            Self::NotAuthenticated => "Please sign in to continue".to_owned(),
            Self::ProfileNotFound(_) => {
                "Your account profile could not be found. Please contact support.".to_owned()
            }
            Self::PartnerNotFound(_) => "Business account not found".to_owned(),
            Self::Forbidden => "You do not have permission to do that".to_owned(),
            Self::InvalidTransition { from, to } => {
                format!("A {from} business account cannot be set to {to}")
            }
            Self::IncompleteRegistration { .. } => {
                "Your account was created but setup could not be finished. Please contact support."
                    .to_owned()
            }
            Self::Provider(e) if e.is_transient() => {
                "The sign-in service is busy. Please try again in a moment.".to_owned()
            }
            Self::Provider(_) => {
                "The sign-in service is unavailable. Please try again.".to_owned()
            }
            Self::Repository(_) => "Something went wrong. Please try again.".to_owned(),
        }
    }

    /// Whether this failure points at infrastructure rather than user input.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Repository(_) | Self::IncompleteRegistration { .. }
        )
    }
}
