//! Session coordinator.
//!
//! [`SessionCoordinator`] owns the one [`SessionSnapshot`] of the process and
//! is the only thing that writes it. Consumers read clones through
//! [`SessionCoordinator::snapshot`] or follow changes through a
//! `watch::Receiver` from [`SessionCoordinator::subscribe`].
//!
//! # Ordering
//!
//! Every transition draws a ticket from a monotonic counter when it starts.
//! A result that changes the principal is committed only if no transition
//! with a later ticket has committed already; otherwise it is dropped (the
//! caller still gets its own `Result`). Error overlays follow the same rule
//! but do not advance the revision.
//!
//! `loading` is derived from the number of transitions in flight, so it never
//! reads `false` while a gateway call started here is still outstanding.
//!
//! # Provider events
//!
//! One spawned task drains the provider's event stream in order. It holds a
//! `Weak` reference and exits once the coordinator is dropped. Events take
//! their own ticket like any other transition, so a sign-out from the
//! provider wins over an older caller transition still in flight. A
//! `SignedIn` for the principal already shown is skipped.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use url::Url;

use framecraft_core::IdentityId;

use crate::db::ProfileStore;
use crate::error::{add_breadcrumb, clear_sentry_user, report, set_sentry_user};
use crate::identity::{AuthChangeEvent, AuthEvent, IdentityProvider, OAuthProvider};
use crate::models::{AuthenticatedIdentity, BusinessPartnerProfile, ProfileUpdate, SessionSnapshot};
use crate::services::auth::{
    AuthError, AuthOutcome, AuthService, BusinessRegistration, IndividualRegistration,
};

/// The single owner of the current session snapshot.
///
/// Cheap to clone; clones share the snapshot.
pub struct SessionCoordinator<P, S> {
    inner: Arc<Inner<P, S>>,
}

impl<P, S> Clone for SessionCoordinator<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<P, S> {
    auth: AuthService<P, S>,
    state: watch::Sender<SessionSnapshot>,
    next_ticket: AtomicU64,
    in_flight: AtomicUsize,
    listener: OnceLock<AbortHandle>,
}

impl<P, S> Drop for Inner<P, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get() {
            handle.abort();
        }
    }
}

/// Marks a transition as in flight until dropped.
struct Transition<'a, P, S> {
    inner: &'a Inner<P, S>,
    ticket: u64,
}

impl<P, S> Drop for Transition<'_, P, S> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        let in_flight = &self.inner.in_flight;
        self.inner.state.send_if_modified(|s| {
            let loading = in_flight.load(Ordering::SeqCst) > 0;
            let changed = s.loading != loading;
            s.loading = loading;
            changed
        });
    }
}

impl<P: IdentityProvider, S: ProfileStore> SessionCoordinator<P, S> {
    /// Create the coordinator and start listening for provider events.
    ///
    /// Must be called inside a Tokio runtime. The snapshot starts out
    /// loading; call [`Self::initialize`] to settle it.
    #[must_use]
    pub fn new(auth: AuthService<P, S>) -> Self {
        let events = auth.provider().subscribe();
        let (state, _) = watch::channel(SessionSnapshot::default());

        let inner = Arc::new(Inner {
            auth,
            state,
            next_ticket: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            listener: OnceLock::new(),
        });

        let task = tokio::spawn(listen(Arc::downgrade(&inner), events));
        let _ = inner.listener.set(task.abort_handle());

        Self { inner }
    }

    /// The gateway this coordinator drives.
    #[must_use]
    pub fn auth(&self) -> &AuthService<P, S> {
        &self.inner.auth
    }

    /// A copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Follow snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Wait until no transition is in flight and return that snapshot.
    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|s| !s.loading).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Drop the error overlay.
    pub fn clear_error(&self) {
        self.inner.state.send_if_modified(|s| s.error.take().is_some());
    }

    // =========================================================================
    // Start-up and sign-in
    // =========================================================================

    /// Rebuild the snapshot from the provider's current session.
    ///
    /// Any failure leaves the snapshot unauthenticated with the error set.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure after recording it in the snapshot.
    pub async fn initialize(&self) -> Result<Option<AuthOutcome>, AuthError> {
        let transition = self.begin();
        let result = self.inner.auth.fetch_current_outcome().await;

        match &result {
            Ok(Some(outcome)) => self.commit_signed_in(&transition, outcome),
            Ok(None) => {
                self.commit(&transition, |s| {
                    s.clear_principal();
                    s.error = None;
                });
            }
            Err(e) => {
                report("initialize", e);
                let message = e.user_message();
                self.commit(&transition, |s| {
                    s.clear_principal();
                    s.error = Some(message);
                });
            }
        }

        self.inner.state.send_if_modified(|s| {
            let first = !s.initialized;
            s.initialized = true;
            first
        });
        result
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure; the previous principal stays in place.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let transition = self.begin();
        let result = self.inner.auth.authenticate(email, password).await;
        self.finish_sign_in("login", &transition, result)
    }

    /// Register an individual customer and sign them in.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure; the previous principal stays in place.
    pub async fn register_individual(
        &self,
        form: &IndividualRegistration,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let transition = self.begin();
        let result = self
            .inner
            .auth
            .register_individual(form)
            .await
            .map(|identity| AuthOutcome {
                identity,
                business_profile: None,
            });
        self.finish_sign_in("register_individual", &transition, result)
            .map(|outcome| outcome.identity)
    }

    /// Register a business partner and sign them in. The account is pending.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure; the previous principal stays in place.
    pub async fn register_business_partner(
        &self,
        form: &BusinessRegistration,
    ) -> Result<AuthOutcome, AuthError> {
        let transition = self.begin();
        let result = self.inner.auth.register_business_partner(form).await;
        self.finish_sign_in("register_business_partner", &transition, result)
    }

    /// Start an external OAuth sign-in and return the URL to send the user to.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure after recording it in the snapshot.
    pub async fn start_external_sign_in(&self, provider: OAuthProvider) -> Result<Url, AuthError> {
        let transition = self.begin();
        let result = self
            .inner
            .auth
            .authenticate_with_external_provider(provider)
            .await;
        self.finish_overlay("start_external_sign_in", &transition, result)
    }

    /// Finish an external OAuth sign-in with the callback code.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure; the previous principal stays in place.
    pub async fn complete_external_sign_in(&self, code: &str) -> Result<AuthOutcome, AuthError> {
        let transition = self.begin();
        let result = self.inner.auth.complete_external_sign_in(code).await;
        self.finish_sign_in("complete_external_sign_in", &transition, result)
    }

    /// Sign out. Always ends unauthenticated, even if the provider call fails.
    pub async fn logout(&self) {
        let transition = self.begin();
        self.inner.auth.end_session().await;
        self.commit_signed_out(&transition);
    }

    // =========================================================================
    // Profile, password and verification
    // =========================================================================

    /// Update the signed-in principal's profile. Only the identity changes.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure after recording it in the snapshot.
    pub async fn update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let transition = self.begin();
        let result = self.inner.auth.update_profile(update).await;

        match &result {
            Ok(identity) => {
                let identity = identity.clone();
                self.commit(&transition, |s| {
                    s.identity = Some(identity);
                    s.error = None;
                });
            }
            Err(e) => self.fail("update_profile", &transition, e),
        }
        result
    }

    /// Ask for a password-reset email.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure after recording it in the snapshot.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let transition = self.begin();
        let result = self.inner.auth.reset_password_request(email).await;
        self.finish_overlay("request_password_reset", &transition, result)
    }

    /// Change the signed-in principal's password.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure after recording it in the snapshot.
    pub async fn update_password(&self, password: &str, confirm: &str) -> Result<(), AuthError> {
        let transition = self.begin();
        let result = self.inner.auth.update_password(password, confirm).await;
        self.finish_overlay("update_password", &transition, result)
    }

    /// Confirm an email address, then rebuild the snapshot.
    ///
    /// # Errors
    ///
    /// Returns the verification failure, or the re-initialization failure.
    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        {
            let transition = self.begin();
            let result = self.inner.auth.verify_email(token).await;
            self.finish_overlay("verify_email", &transition, result)?;
        }
        self.initialize().await.map(|_| ())
    }

    /// Send the verification email again.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure after recording it in the snapshot.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let transition = self.begin();
        let result = self.inner.auth.resend_verification(email).await;
        self.finish_overlay("resend_verification", &transition, result)
    }

    // =========================================================================
    // Business partner administration
    // =========================================================================

    /// Approve a business partner as the signed-in admin.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` or `AuthError::Forbidden` unless
    /// an admin is signed in, otherwise the gateway failure.
    pub async fn approve_partner(
        &self,
        partner_id: IdentityId,
    ) -> Result<BusinessPartnerProfile, AuthError> {
        let approver = self.require_admin("approve_partner")?;
        let transition = self.begin();
        let result = self
            .inner
            .auth
            .approve_business_partner(partner_id, approver)
            .await;
        self.finish_overlay("approve_partner", &transition, result)
    }

    /// Reject a business partner as the signed-in admin.
    ///
    /// # Errors
    ///
    /// As [`Self::approve_partner`].
    pub async fn reject_partner(
        &self,
        partner_id: IdentityId,
    ) -> Result<BusinessPartnerProfile, AuthError> {
        self.require_admin("reject_partner")?;
        let transition = self.begin();
        let result = self.inner.auth.reject_business_partner(partner_id).await;
        self.finish_overlay("reject_partner", &transition, result)
    }

    /// Suspend an approved business partner as the signed-in admin.
    ///
    /// # Errors
    ///
    /// As [`Self::approve_partner`], plus `AuthError::InvalidTransition`.
    pub async fn suspend_partner(
        &self,
        partner_id: IdentityId,
    ) -> Result<BusinessPartnerProfile, AuthError> {
        self.require_admin("suspend_partner")?;
        let transition = self.begin();
        let result = self.inner.auth.suspend_business_partner(partner_id).await;
        self.finish_overlay("suspend_partner", &transition, result)
    }

    fn require_admin(&self, operation: &str) -> Result<IdentityId, AuthError> {
        let snapshot = self.inner.state.borrow();
        let err = match snapshot.identity.as_ref() {
            Some(identity) if snapshot.is_admin() => return Ok(identity.id),
            Some(_) => AuthError::Forbidden,
            None => AuthError::NotAuthenticated,
        };
        drop(snapshot);

        warn!(operation, error = %err, "Admin action refused");
        let message = err.user_message();
        self.inner.state.send_modify(|s| s.error = Some(message));
        Err(err)
    }

    // =========================================================================
    // Provider events
    // =========================================================================

    async fn handle_event(&self, event: AuthEvent) {
        match event.kind {
            AuthChangeEvent::SignedIn => {
                let already_shown = event.session.as_ref().is_some_and(|session| {
                    self.inner
                        .state
                        .borrow()
                        .identity
                        .as_ref()
                        .is_some_and(|i| i.id == session.user.id)
                });
                if already_shown {
                    debug!("Sign-in event for the principal already shown");
                    return;
                }
                self.resync().await;
            }
            AuthChangeEvent::SignedOut => {
                if !self.inner.state.borrow().is_authenticated() {
                    return;
                }
                let transition = self.begin();
                self.commit_signed_out(&transition);
            }
            AuthChangeEvent::TokenRefreshed => {
                let in_flight = &self.inner.in_flight;
                self.inner.state.send_if_modified(|s| {
                    let loading = in_flight.load(Ordering::SeqCst) > 0;
                    let changed = s.loading != loading;
                    s.loading = loading;
                    changed
                });
                debug!("Session token refreshed");
            }
            AuthChangeEvent::UserUpdated | AuthChangeEvent::PasswordRecovery => {
                debug!(kind = ?event.kind, "Ignoring auth event");
            }
        }
    }

    /// Rebuild the principal from the provider after an outside sign-in.
    async fn resync(&self) {
        let transition = self.begin();
        match self.inner.auth.fetch_current_outcome().await {
            Ok(Some(outcome)) => self.commit_signed_in(&transition, &outcome),
            Ok(None) => {
                self.commit(&transition, |s| s.clear_principal());
            }
            Err(e) => {
                report("sign_in_event", &e);
                let message = e.user_message();
                self.commit(&transition, |s| {
                    s.clear_principal();
                    s.error = Some(message);
                });
            }
        }
    }

    // =========================================================================
    // Transition plumbing
    // =========================================================================

    fn begin(&self) -> Transition<'_, P, S> {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);

        self.inner.state.send_if_modified(|s| {
            let changed = !s.loading;
            s.loading = true;
            changed
        });

        Transition {
            inner: &self.inner,
            ticket,
        }
    }

    /// Apply a principal-changing result unless a later transition already
    /// committed. Returns whether it was applied.
    fn commit(
        &self,
        transition: &Transition<'_, P, S>,
        apply: impl FnOnce(&mut SessionSnapshot),
    ) -> bool {
        let ticket = transition.ticket;
        self.inner.state.send_if_modified(|s| {
            if ticket < s.revision {
                debug!(ticket, revision = s.revision, "Discarding superseded session result");
                return false;
            }
            apply(s);
            s.revision = ticket;
            true
        })
    }

    /// Set or clear the error overlay without touching the principal.
    fn overlay(&self, transition: &Transition<'_, P, S>, error: Option<String>) {
        let ticket = transition.ticket;
        self.inner.state.send_if_modified(|s| {
            if ticket < s.revision || s.error == error {
                return false;
            }
            s.error = error;
            true
        });
    }

    fn fail(&self, operation: &str, transition: &Transition<'_, P, S>, err: &AuthError) {
        report(operation, err);
        self.overlay(transition, Some(err.user_message()));
    }

    fn finish_overlay<T>(
        &self,
        operation: &str,
        transition: &Transition<'_, P, S>,
        result: Result<T, AuthError>,
    ) -> Result<T, AuthError> {
        match &result {
            Ok(_) => self.overlay(transition, None),
            Err(e) => self.fail(operation, transition, e),
        }
        result
    }

    fn finish_sign_in(
        &self,
        operation: &str,
        transition: &Transition<'_, P, S>,
        result: Result<AuthOutcome, AuthError>,
    ) -> Result<AuthOutcome, AuthError> {
        match &result {
            Ok(outcome) => self.commit_signed_in(transition, outcome),
            Err(e) => self.fail(operation, transition, e),
        }
        result
    }

    fn commit_signed_in(&self, transition: &Transition<'_, P, S>, outcome: &AuthOutcome) {
        let identity = outcome.identity.clone();
        let business = outcome.business_profile.clone();
        let applied = self.commit(transition, |s| {
            s.identity = Some(identity);
            s.business_profile = business;
            s.error = None;
        });

        if applied {
            let id = outcome.identity.id;
            set_sentry_user(&id, Some(outcome.identity.email.as_str()));
            add_breadcrumb("auth", "Signed in", Some(&[("role", outcome.identity.role.as_str())]));
            info!(user_id = %id, "Session authenticated");
        }
    }

    fn commit_signed_out(&self, transition: &Transition<'_, P, S>) {
        let applied = self.commit(transition, |s| {
            s.clear_principal();
            s.error = None;
        });

        if applied {
            clear_sentry_user();
            add_breadcrumb("auth", "Signed out", None);
            info!("Session signed out");
        }
    }
}

async fn listen<P: IdentityProvider, S: ProfileStore>(
    coordinator: Weak<Inner<P, S>>,
    mut events: broadcast::Receiver<AuthEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Auth event listener lagged, resynchronizing");
                AuthEvent::new(AuthChangeEvent::SignedIn, None)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let Some(inner) = coordinator.upgrade() else {
            break;
        };
        SessionCoordinator { inner }.handle_event(event).await;
    }
    debug!("Auth event listener stopped");
}
