//! Authentication service.
//!
//! [`AuthService`] is the identity gateway: every operation that touches the
//! identity provider or the profile store goes through it. It keeps no state
//! of its own; the provider client holds the session and the store holds the
//! profile rows. It never retries.

mod error;
pub mod roles;
pub mod validation;

pub use error::{AuthError, RegistrationStage};
pub use validation::{
    BusinessRegistration, FieldError, IndividualRegistration, ValidationErrors,
};

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use url::Url;

use framecraft_core::{ApprovalStatus, Email, IdentityId, UserRole};

use crate::db::{ProfileStore, RepositoryError};
use crate::identity::{IdentityProvider, OAuthProvider, ProviderUser, SignOutScope};
use crate::models::{
    AuthenticatedIdentity, BusinessPartnerProfile, NewBusinessProfile, NewProfile, ProfileUpdate,
};

/// A signed-in principal together with its business account, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub identity: AuthenticatedIdentity,
    pub business_profile: Option<BusinessPartnerProfile>,
}

/// Authentication service.
///
/// Cheap to clone; the provider and store are shared.
pub struct AuthService<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
}

impl<P, S> Clone for AuthService<P, S> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            store: Arc::clone(&self.store),
        }
    }
}

impl<P: IdentityProvider, S: ProfileStore> AuthService<P, S> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(provider: Arc<P>, store: Arc<S>) -> Self {
        Self { provider, store }
    }

    /// The identity provider this service talks to.
    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    // =========================================================================
    // Sign-in
    // =========================================================================

    /// Sign in with email and password and stamp the login time.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::ProviderRejected` if the provider refuses the credentials.
    /// Returns `AuthError::ProfileNotFound` if the identity has no profile row.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let email = Email::parse(email)?;

        let session = self.provider.sign_in_with_password(&email, password).await?;
        let outcome = self.load_outcome(&session.user).await?;

        info!(user_id = %outcome.identity.id, role = %outcome.identity.role, "User signed in");
        Ok(outcome)
    }

    /// Start an external OAuth sign-in; the caller redirects to the URL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Provider` if the provider client is misconfigured.
    pub async fn authenticate_with_external_provider(
        &self,
        provider: OAuthProvider,
    ) -> Result<Url, AuthError> {
        Ok(self.provider.authorize_url(provider).await?)
    }

    /// Finish an external OAuth sign-in with the callback code.
    ///
    /// First-time external sign-ins get an individual customer profile built
    /// from the provider's user record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ProviderRejected` if the code is refused.
    /// Returns `AuthError::Provider` if no sign-in was started.
    #[instrument(skip_all)]
    pub async fn complete_external_sign_in(&self, code: &str) -> Result<AuthOutcome, AuthError> {
        let session = self.provider.exchange_code_for_session(code).await?;
        let user = &session.user;

        if self.store.get_profile(user.id).await?.is_none() {
            self.provision_external_profile(user).await?;
        }

        let outcome = self.load_outcome(user).await?;
        info!(user_id = %outcome.identity.id, "User signed in with external provider");
        Ok(outcome)
    }

    async fn provision_external_profile(
        &self,
        user: &ProviderUser,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let Some(email) = user.email.as_deref() else {
            return Err(AuthError::ProviderRejected(
                "External account has no email address".to_owned(),
            ));
        };
        let email = Email::parse(email)?;

        let metadata_str = |key: &str| {
            user.user_metadata
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };

        let profile = NewProfile {
            id: user.id,
            email,
            full_name: metadata_str("full_name").or_else(|| metadata_str("name")),
            phone: user.phone.clone().filter(|p| !p.is_empty()),
            role: UserRole::IndividualCustomer,
            email_verified: user.email_confirmed(),
        };

        match self.store.create_profile(&profile).await {
            Ok(created) => {
                info!(user_id = %created.id, "Provisioned profile for external sign-in");
                Ok(created)
            }
            Err(source) => Err(AuthError::IncompleteRegistration {
                identity_id: user.id,
                stage: RegistrationStage::Profile,
                source,
            }),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register an individual customer.
    ///
    /// The form is validated before anything is sent to the provider.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` with every failed field check.
    /// Returns `AuthError::ProviderRejected` if the provider refuses the sign-up.
    /// Returns `AuthError::IncompleteRegistration` if the profile insert fails
    /// after the provider account was created.
    #[instrument(skip_all, fields(email = %form.email))]
    pub async fn register_individual(
        &self,
        form: &IndividualRegistration,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let email = validation::validate_individual(form)?;

        let full_name = form.full_name.trim().to_owned();
        let phone = trimmed(form.phone.as_deref());
        let metadata = json!({
            "full_name": full_name,
            "phone": phone,
            "role": UserRole::IndividualCustomer,
        });

        let signup = self.provider.sign_up(&email, &form.password, metadata).await?;
        let identity_id = signup.user.id;

        let identity = self
            .store
            .create_profile(&NewProfile {
                id: identity_id,
                email,
                full_name: Some(full_name),
                phone,
                role: UserRole::IndividualCustomer,
                email_verified: signup.user.email_confirmed(),
            })
            .await
            .map_err(|source| incomplete(identity_id, RegistrationStage::Profile, source))?;

        info!(user_id = %identity.id, "Individual customer registered");
        Ok(identity)
    }

    /// Register a business partner. The business account starts `pending`.
    ///
    /// # Errors
    ///
    /// As [`Self::register_individual`], plus `AuthError::IncompleteRegistration`
    /// if the business account insert fails after the profile exists.
    #[instrument(skip_all, fields(email = %form.account.email, company = %form.company_name))]
    pub async fn register_business_partner(
        &self,
        form: &BusinessRegistration,
    ) -> Result<AuthOutcome, AuthError> {
        let valid = validation::validate_business(form)?;

        let full_name = form.account.full_name.trim().to_owned();
        let phone = trimmed(form.account.phone.as_deref());
        let metadata = json!({
            "full_name": full_name,
            "phone": phone,
            "role": UserRole::BusinessPartner,
            "company_name": form.company_name.trim(),
        });

        let signup = self
            .provider
            .sign_up(&valid.email, &form.account.password, metadata)
            .await?;
        let identity_id = signup.user.id;

        let identity = self
            .store
            .create_profile(&NewProfile {
                id: identity_id,
                email: valid.email,
                full_name: Some(full_name),
                phone,
                role: UserRole::BusinessPartner,
                email_verified: signup.user.email_confirmed(),
            })
            .await
            .map_err(|source| incomplete(identity_id, RegistrationStage::Profile, source))?;

        let business = self
            .store
            .create_business_profile(&NewBusinessProfile {
                identity_id,
                company_name: form.company_name.trim().to_owned(),
                business_type: trimmed(form.business_type.as_deref()),
                tax_id: trimmed(form.tax_id.as_deref()),
                address: form.address.clone(),
                contact_person: trimmed(form.contact_person.as_deref()),
                contact_phone: trimmed(form.contact_phone.as_deref()),
                contact_email: valid.contact_email,
            })
            .await
            .map_err(|source| incomplete(identity_id, RegistrationStage::BusinessAccount, source))?;

        info!(user_id = %identity.id, company = %business.company_name, "Business partner registered, pending approval");
        Ok(AuthOutcome {
            identity,
            business_profile: Some(business),
        })
    }

    // =========================================================================
    // Current identity
    // =========================================================================

    /// The profile behind the provider's current session, if there is one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ProviderRejected` if the session is no longer valid.
    /// Returns `AuthError::ProfileNotFound` if the identity has no profile row.
    pub async fn fetch_current_identity(&self) -> Result<Option<AuthenticatedIdentity>, AuthError> {
        let Some(user) = self.provider.current_user().await? else {
            return Ok(None);
        };

        let profile = self
            .store
            .get_profile(user.id)
            .await?
            .ok_or(AuthError::ProfileNotFound(user.id))?;

        Ok(Some(reconcile(profile, &user)))
    }

    /// The business account for `id`. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the lookup fails.
    pub async fn fetch_business_profile(
        &self,
        id: IdentityId,
    ) -> Result<Option<BusinessPartnerProfile>, AuthError> {
        Ok(self.store.get_business_profile(id).await?)
    }

    /// Current identity plus its business account when the role calls for one.
    ///
    /// # Errors
    ///
    /// As [`Self::fetch_current_identity`].
    pub async fn fetch_current_outcome(&self) -> Result<Option<AuthOutcome>, AuthError> {
        let Some(identity) = self.fetch_current_identity().await? else {
            return Ok(None);
        };
        let business_profile = self.business_profile_for(&identity).await?;

        Ok(Some(AuthOutcome {
            identity,
            business_profile,
        }))
    }

    /// Update the signed-in principal's profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` without a session.
    /// Returns `AuthError::Validation` if the new name or phone is invalid.
    pub async fn update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        validation::validate_profile_update(update)?;

        let user = self
            .provider
            .current_user()
            .await?
            .ok_or(AuthError::NotAuthenticated)?;

        let profile = self
            .store
            .update_profile(user.id, update)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::ProfileNotFound(user.id),
                other => AuthError::Repository(other),
            })?;

        Ok(reconcile(profile, &user))
    }

    // =========================================================================
    // Password & verification
    // =========================================================================

    /// Ask the provider to email a password-reset link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::ProviderRejected`.
    pub async fn reset_password_request(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        self.provider.request_password_reset(&email).await?;
        info!(email = %email, "Password reset requested");
        Ok(())
    }

    /// Change the signed-in principal's password.
    ///
    /// Confirmation and strength are checked before the provider is called.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordMismatch` if `confirm` differs.
    /// Returns `AuthError::Validation` if the password is too weak.
    /// Returns `AuthError::ProviderRejected` if the provider refuses it.
    pub async fn update_password(&self, password: &str, confirm: &str) -> Result<(), AuthError> {
        if password != confirm {
            return Err(AuthError::PasswordMismatch);
        }
        validation::validate_password(password)?;

        let user = self.provider.update_password(password).await?;
        info!(user_id = %user.id, "Password updated");
        Ok(())
    }

    /// Confirm an email address with a verification token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ProviderRejected` if the token is invalid or expired.
    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        self.provider.verify_email(token).await?;
        Ok(())
    }

    /// Send the verification email again.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::ProviderRejected`.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        self.provider.resend_verification(&email).await?;
        Ok(())
    }

    /// End the provider session. Never fails; the local session is gone
    /// either way.
    pub async fn end_session(&self) {
        if let Err(e) = self.provider.sign_out(SignOutScope::Local).await {
            warn!(error = %e, "Remote sign-out failed; local session cleared");
        }
    }

    // =========================================================================
    // Business partner approval
    // =========================================================================

    /// Approve a business account, recording the approver.
    ///
    /// Accounts that are already approved or rejected are approved anyway and
    /// a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PartnerNotFound` if there is no business account.
    #[instrument(skip(self))]
    pub async fn approve_business_partner(
        &self,
        partner_id: IdentityId,
        approver_id: IdentityId,
    ) -> Result<BusinessPartnerProfile, AuthError> {
        let current = self.require_partner(partner_id).await?;
        if current.approval_status.is_finalized() {
            warn!(
                %partner_id,
                status = %current.approval_status,
                "Approving a business account that was already decided"
            );
        }

        let updated = self
            .set_status(partner_id, ApprovalStatus::Approved, Some(approver_id))
            .await?;
        info!(%partner_id, %approver_id, "Business partner approved");
        Ok(updated)
    }

    /// Reject a business account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PartnerNotFound` if there is no business account.
    #[instrument(skip(self))]
    pub async fn reject_business_partner(
        &self,
        partner_id: IdentityId,
    ) -> Result<BusinessPartnerProfile, AuthError> {
        let current = self.require_partner(partner_id).await?;
        if current.approval_status.is_finalized() {
            warn!(
                %partner_id,
                status = %current.approval_status,
                "Rejecting a business account that was already decided"
            );
        }

        let updated = self
            .set_status(partner_id, ApprovalStatus::Rejected, None)
            .await?;
        info!(%partner_id, "Business partner rejected");
        Ok(updated)
    }

    /// Suspend an approved business account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PartnerNotFound` if there is no business account.
    /// Returns `AuthError::InvalidTransition` unless the account is approved.
    #[instrument(skip(self))]
    pub async fn suspend_business_partner(
        &self,
        partner_id: IdentityId,
    ) -> Result<BusinessPartnerProfile, AuthError> {
        let current = self.require_partner(partner_id).await?;
        if current.approval_status != ApprovalStatus::Approved {
            return Err(AuthError::InvalidTransition {
                from: current.approval_status,
                to: ApprovalStatus::Suspended,
            });
        }

        let updated = self
            .set_status(partner_id, ApprovalStatus::Suspended, None)
            .await?;
        info!(%partner_id, "Business partner suspended");
        Ok(updated)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Stamp the login and assemble the outcome for a freshly signed-in user.
    async fn load_outcome(&self, user: &ProviderUser) -> Result<AuthOutcome, AuthError> {
        let profile = self
            .store
            .record_login(user.id, Utc::now())
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::ProfileNotFound(user.id),
                other => AuthError::Repository(other),
            })?;

        let identity = reconcile(profile, user);
        let business_profile = self.business_profile_for(&identity).await?;

        Ok(AuthOutcome {
            identity,
            business_profile,
        })
    }

    async fn business_profile_for(
        &self,
        identity: &AuthenticatedIdentity,
    ) -> Result<Option<BusinessPartnerProfile>, AuthError> {
        match identity.role {
            UserRole::BusinessPartner => self.fetch_business_profile(identity.id).await,
            UserRole::IndividualCustomer | UserRole::Admin | UserRole::SuperAdmin => Ok(None),
        }
    }

    async fn require_partner(
        &self,
        partner_id: IdentityId,
    ) -> Result<BusinessPartnerProfile, AuthError> {
        self.store
            .get_business_profile(partner_id)
            .await?
            .ok_or(AuthError::PartnerNotFound(partner_id))
    }

    async fn set_status(
        &self,
        partner_id: IdentityId,
        status: ApprovalStatus,
        approved_by: Option<IdentityId>,
    ) -> Result<BusinessPartnerProfile, AuthError> {
        self.store
            .set_approval_status(partner_id, status, approved_by)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::PartnerNotFound(partner_id),
                other => AuthError::Repository(other),
            })
    }
}

/// Fold the provider's confirmation flags into the stored profile.
fn reconcile(mut profile: AuthenticatedIdentity, user: &ProviderUser) -> AuthenticatedIdentity {
    profile.email_verified |= user.email_confirmed();
    profile.phone_verified |= user.phone_confirmed();
    profile
}

fn incomplete(
    identity_id: IdentityId,
    stage: RegistrationStage,
    source: RepositoryError,
) -> AuthError {
    AuthError::IncompleteRegistration {
        identity_id,
        stage,
        source,
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}
