//! Integration tests for the Framecraft identity layer.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p framecraft-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `gateway` - `AuthService` against in-memory collaborators
//! - `session_coordinator` - snapshot transitions, ordering and provider events
//! - `identity_client` - the HTTP client against a mock identity provider
//!
//! The fakes in this crate stand in for the identity provider and the
//! `PostgreSQL` profile store, so none of the suites need a network or a
//! database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use url::Url;

use framecraft_core::{ApprovalStatus, Email, IdentityId, UserRole};
use framecraft_storefront::db::{ProfileStore, RepositoryError};
use framecraft_storefront::identity::{
    AuthChangeEvent, AuthEvent, IdentityError, IdentityProvider, OAuthProvider, ProviderSession,
    ProviderUser, SignOutScope, SignUpOutcome,
};
use framecraft_storefront::models::{
    AuthenticatedIdentity, BusinessAddress, BusinessPartnerProfile, NewBusinessProfile, NewProfile,
    ProfileUpdate,
};
use framecraft_storefront::{AuthService, SessionCoordinator};

/// A password that passes every strength rule.
pub const STRONG_PASSWORD: &str = "Gilded1frame";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Builders
// =============================================================================

/// Parse a test email address.
///
/// # Panics
///
/// Panics if `email` is not a valid address.
#[must_use]
#[allow(clippy::expect_used)]
pub fn email(email: &str) -> Email {
    Email::parse(email).expect("test email should be valid")
}

/// A provider-side user record.
#[must_use]
pub fn provider_user(id: IdentityId, address: &str, confirmed: bool) -> ProviderUser {
    ProviderUser {
        id,
        email: Some(address.to_owned()),
        phone: None,
        email_confirmed_at: confirmed.then(Utc::now),
        phone_confirmed_at: None,
        last_sign_in_at: None,
        user_metadata: serde_json::Value::Null,
    }
}

/// A one-hour session for `user`.
#[must_use]
pub fn session_for(user: ProviderUser) -> ProviderSession {
    ProviderSession {
        access_token: format!("access-{}", user.id),
        refresh_token: format!("refresh-{}", user.id),
        token_type: "bearer".to_owned(),
        expires_in: 3600,
        expires_at: Some(Utc::now().timestamp() + 3600),
        user,
    }
}

/// A stored profile with the given role.
#[must_use]
pub fn profile(id: IdentityId, address: &str, role: UserRole) -> AuthenticatedIdentity {
    let now = Utc::now();
    AuthenticatedIdentity {
        id,
        email: email(address),
        full_name: Some("Test Framer".to_owned()),
        phone: None,
        role,
        is_active: true,
        email_verified: false,
        phone_verified: false,
        avatar_url: None,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// A stored business account in the given status.
#[must_use]
pub fn business_account(identity_id: IdentityId, status: ApprovalStatus) -> BusinessPartnerProfile {
    let now = Utc::now();
    BusinessPartnerProfile {
        identity_id,
        company_name: "Frame & Co".to_owned(),
        business_type: Some("gallery".to_owned()),
        tax_id: None,
        address: BusinessAddress {
            street: "1 Gallery Row".to_owned(),
            city: "Portland".to_owned(),
            state: Some("OR".to_owned()),
            zip: "97201".to_owned(),
            country: "US".to_owned(),
        },
        contact_person: None,
        contact_phone: None,
        contact_email: None,
        credit_limit: Decimal::ZERO,
        payment_terms_days: 30,
        discount_percentage: Decimal::ZERO,
        approval_status: status,
        approved_by: None,
        approved_at: None,
        verification_documents: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Fake identity provider
// =============================================================================

struct Account {
    password: String,
    user: ProviderUser,
}

#[derive(Default)]
struct ProviderState {
    accounts: HashMap<String, Account>,
    session: Option<ProviderSession>,
    oauth_codes: HashMap<String, ProviderUser>,
    oauth_pending: bool,
    verification_tokens: HashMap<String, String>,
    sign_in_delays: HashMap<String, Duration>,
    sign_up_rejection: Option<String>,
    reset_requests: Vec<String>,
}

/// In-memory identity provider that publishes events the way the HTTP client
/// does.
pub struct FakeIdentityProvider {
    state: Mutex<ProviderState>,
    events: broadcast::Sender<AuthEvent>,
    sign_in_calls: AtomicUsize,
    sign_up_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    current_user_calls: AtomicUsize,
    update_password_calls: AtomicUsize,
    fail_sign_out: AtomicBool,
}

impl Default for FakeIdentityProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: Mutex::default(),
            events,
            sign_in_calls: AtomicUsize::new(0),
            sign_up_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            current_user_calls: AtomicUsize::new(0),
            update_password_calls: AtomicUsize::new(0),
            fail_sign_out: AtomicBool::new(false),
        }
    }
}

impl FakeIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account that can sign in with `password`.
    pub fn add_account(&self, address: &str, password: &str, confirmed: bool) -> IdentityId {
        let id = IdentityId::random();
        lock(&self.state).accounts.insert(
            address.to_owned(),
            Account {
                password: password.to_owned(),
                user: provider_user(id, address, confirmed),
            },
        );
        id
    }

    /// Make a code exchangeable for a session of `user`.
    pub fn add_oauth_code(&self, code: &str, user: ProviderUser) {
        lock(&self.state).oauth_codes.insert(code.to_owned(), user);
    }

    /// Make `token` confirm the email of the account registered as `address`.
    pub fn add_verification_token(&self, token: &str, address: &str) {
        lock(&self.state)
            .verification_tokens
            .insert(token.to_owned(), address.to_owned());
    }

    /// Delay password sign-ins for `address`.
    pub fn delay_sign_in(&self, address: &str, delay: Duration) {
        lock(&self.state)
            .sign_in_delays
            .insert(address.to_owned(), delay);
    }

    /// Refuse every sign-up with `message`.
    pub fn reject_sign_ups(&self, message: &str) {
        lock(&self.state).sign_up_rejection = Some(message.to_owned());
    }

    /// Make the remote sign-out call fail (the local session still ends).
    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    /// Sign `address` in from outside the coordinator (another tab, a magic
    /// link) and publish the event.
    ///
    /// # Panics
    ///
    /// Panics if no account exists for `address`.
    #[allow(clippy::expect_used)]
    pub fn sign_in_elsewhere(&self, address: &str) -> ProviderSession {
        let session = {
            let mut state = lock(&self.state);
            let user = state
                .accounts
                .get(address)
                .map(|a| a.user.clone())
                .expect("account should exist");
            let session = session_for(user);
            state.session = Some(session.clone());
            session
        };
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        session
    }

    /// Drop the session as if it expired, and publish the event.
    pub fn expire_session(&self) {
        lock(&self.state).session = None;
        self.emit(AuthChangeEvent::SignedOut, None);
    }

    /// Publish an arbitrary event.
    pub fn emit(&self, kind: AuthChangeEvent, session: Option<ProviderSession>) {
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    #[must_use]
    pub fn session(&self) -> Option<ProviderSession> {
        lock(&self.state).session.clone()
    }

    #[must_use]
    pub fn user(&self, address: &str) -> Option<ProviderUser> {
        lock(&self.state).accounts.get(address).map(|a| a.user.clone())
    }

    #[must_use]
    pub fn password_of(&self, address: &str) -> Option<String> {
        lock(&self.state)
            .accounts
            .get(address)
            .map(|a| a.password.clone())
    }

    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        lock(&self.state).reset_requests.clone()
    }

    #[must_use]
    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_up_calls(&self) -> usize {
        self.sign_up_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn current_user_calls(&self) -> usize {
        self.current_user_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn update_password_calls(&self) -> usize {
        self.update_password_calls.load(Ordering::SeqCst)
    }

    fn start_session(&self, user: ProviderUser) -> ProviderSession {
        let session = session_for(user);
        lock(&self.state).session = Some(session.clone());
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        session
    }
}

fn rejected(status: u16, message: &str) -> IdentityError {
    IdentityError::Rejected {
        status,
        message: message.to_owned(),
    }
}

impl IdentityProvider for FakeIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<ProviderSession, IdentityError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);

        let delay = lock(&self.state).sign_in_delays.get(email.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let user = {
            let state = lock(&self.state);
            match state.accounts.get(email.as_str()) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(rejected(400, "Invalid login credentials")),
            }
        };
        Ok(self.start_session(user))
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, IdentityError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = lock(&self.state);
        if let Some(message) = state.sign_up_rejection.clone() {
            return Err(rejected(422, &message));
        }
        if state.accounts.contains_key(email.as_str()) {
            return Err(rejected(422, "User already registered"));
        }

        let mut user = provider_user(IdentityId::random(), email.as_str(), false);
        user.user_metadata = metadata;
        state.accounts.insert(
            email.as_str().to_owned(),
            Account {
                password: password.to_owned(),
                user: user.clone(),
            },
        );
        drop(state);

        // Email confirmation pending: no session yet.
        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    async fn authorize_url(&self, provider: OAuthProvider) -> Result<Url, IdentityError> {
        lock(&self.state).oauth_pending = true;
        Url::parse(&format!(
            "https://id.framecraft.test/auth/v1/authorize?provider={provider}"
        ))
        .map_err(|e| IdentityError::Config(e.to_string()))
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<ProviderSession, IdentityError> {
        let user = {
            let mut state = lock(&self.state);
            if !std::mem::take(&mut state.oauth_pending) {
                return Err(IdentityError::OAuth("no OAuth sign-in in progress".to_owned()));
            }
            state.oauth_codes.remove(code)
        };
        let user = user.ok_or_else(|| rejected(400, "invalid flow state, no valid flow state found"))?;
        Ok(self.start_session(user))
    }

    async fn sign_out(&self, _scope: SignOutScope) -> Result<(), IdentityError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.state).session = None;
        self.emit(AuthChangeEvent::SignedOut, None);

        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(rejected(503, "Service Unavailable"));
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<ProviderUser>, IdentityError> {
        self.current_user_calls.fetch_add(1, Ordering::SeqCst);
        let state = lock(&self.state);
        let Some(session) = state.session.as_ref() else {
            return Ok(None);
        };

        // Reflect confirmations that happened after the session started.
        let user = session
            .user
            .email
            .as_deref()
            .and_then(|address| state.accounts.get(address))
            .map_or_else(|| session.user.clone(), |a| a.user.clone());
        Ok(Some(user))
    }

    async fn request_password_reset(&self, email: &Email) -> Result<(), IdentityError> {
        lock(&self.state)
            .reset_requests
            .push(email.as_str().to_owned());
        Ok(())
    }

    async fn update_password(&self, password: &str) -> Result<ProviderUser, IdentityError> {
        self.update_password_calls.fetch_add(1, Ordering::SeqCst);
        let (user, session) = {
            let mut state = lock(&self.state);
            let Some(session) = state.session.clone() else {
                return Err(IdentityError::NoSession);
            };
            let address = session.user.email.clone().unwrap_or_default();
            let account = state
                .accounts
                .get_mut(&address)
                .ok_or_else(|| rejected(404, "User not found"))?;
            account.password = password.to_owned();
            (account.user.clone(), session)
        };
        self.emit(AuthChangeEvent::UserUpdated, Some(session));
        Ok(user)
    }

    async fn verify_email(&self, token: &str) -> Result<(), IdentityError> {
        let user = {
            let mut state = lock(&self.state);
            let address = state
                .verification_tokens
                .remove(token)
                .ok_or_else(|| rejected(403, "Email link is invalid or has expired"))?;
            let account = state
                .accounts
                .get_mut(&address)
                .ok_or_else(|| rejected(404, "User not found"))?;
            account.user.email_confirmed_at = Some(Utc::now());
            account.user.clone()
        };
        self.start_session(user);
        Ok(())
    }

    async fn resend_verification(&self, email: &Email) -> Result<(), IdentityError> {
        if lock(&self.state).accounts.contains_key(email.as_str()) {
            Ok(())
        } else {
            Err(rejected(404, "User not found"))
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// In-memory profile store
// =============================================================================

/// Profile store backed by hash maps.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: Mutex<HashMap<IdentityId, AuthenticatedIdentity>>,
    businesses: Mutex<HashMap<IdentityId, BusinessPartnerProfile>>,
    fail_profile_insert: AtomicBool,
    fail_business_insert: AtomicBool,
    record_login_calls: AtomicUsize,
}

impl InMemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: AuthenticatedIdentity) {
        lock(&self.profiles).insert(profile.id, profile);
    }

    pub fn insert_business(&self, business: BusinessPartnerProfile) {
        lock(&self.businesses).insert(business.identity_id, business);
    }

    /// Make every profile insert fail.
    pub fn fail_profile_inserts(&self) {
        self.fail_profile_insert.store(true, Ordering::SeqCst);
    }

    /// Make every business account insert fail with a conflict.
    pub fn fail_business_inserts(&self) {
        self.fail_business_insert.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn profile(&self, id: IdentityId) -> Option<AuthenticatedIdentity> {
        lock(&self.profiles).get(&id).cloned()
    }

    #[must_use]
    pub fn business(&self, id: IdentityId) -> Option<BusinessPartnerProfile> {
        lock(&self.businesses).get(&id).cloned()
    }

    #[must_use]
    pub fn profile_count(&self) -> usize {
        lock(&self.profiles).len()
    }

    #[must_use]
    pub fn record_login_calls(&self) -> usize {
        self.record_login_calls.load(Ordering::SeqCst)
    }
}

impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(
        &self,
        id: IdentityId,
    ) -> Result<Option<AuthenticatedIdentity>, RepositoryError> {
        Ok(self.profile(id))
    }

    async fn create_profile(
        &self,
        new: &NewProfile,
    ) -> Result<AuthenticatedIdentity, RepositoryError> {
        if self.fail_profile_insert.load(Ordering::SeqCst) {
            return Err(RepositoryError::DataCorruption(
                "profile insert failed".to_owned(),
            ));
        }

        let mut profiles = lock(&self.profiles);
        if profiles.contains_key(&new.id) || profiles.values().any(|p| p.email == new.email) {
            return Err(RepositoryError::Conflict(format!("profile: {}", new.email)));
        }

        let mut created = profile(new.id, new.email.as_str(), new.role);
        created.full_name.clone_from(&new.full_name);
        created.phone.clone_from(&new.phone);
        created.email_verified = new.email_verified;
        profiles.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_profile(
        &self,
        id: IdentityId,
        update: &ProfileUpdate,
    ) -> Result<AuthenticatedIdentity, RepositoryError> {
        let mut profiles = lock(&self.profiles);
        let existing = profiles.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        if let Some(name) = &update.full_name {
            existing.full_name = Some(name.clone());
        }
        if let Some(phone) = &update.phone {
            existing.phone = Some(phone.clone());
        }
        if let Some(avatar) = &update.avatar_url {
            existing.avatar_url = Some(avatar.clone());
        }
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn record_login(
        &self,
        id: IdentityId,
        at: chrono::DateTime<Utc>,
    ) -> Result<AuthenticatedIdentity, RepositoryError> {
        self.record_login_calls.fetch_add(1, Ordering::SeqCst);
        let mut profiles = lock(&self.profiles);
        let existing = profiles.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        existing.last_login_at = Some(at);
        Ok(existing.clone())
    }

    async fn get_business_profile(
        &self,
        id: IdentityId,
    ) -> Result<Option<BusinessPartnerProfile>, RepositoryError> {
        Ok(self.business(id))
    }

    async fn create_business_profile(
        &self,
        new: &NewBusinessProfile,
    ) -> Result<BusinessPartnerProfile, RepositoryError> {
        if self.fail_business_insert.load(Ordering::SeqCst) {
            return Err(RepositoryError::Conflict(
                "business account: duplicate key".to_owned(),
            ));
        }

        let mut created = business_account(new.identity_id, ApprovalStatus::Pending);
        created.company_name.clone_from(&new.company_name);
        created.business_type.clone_from(&new.business_type);
        created.tax_id.clone_from(&new.tax_id);
        created.address = new.address.clone();
        created.contact_person.clone_from(&new.contact_person);
        created.contact_phone.clone_from(&new.contact_phone);
        created.contact_email.clone_from(&new.contact_email);

        lock(&self.businesses).insert(created.identity_id, created.clone());
        Ok(created)
    }

    async fn set_approval_status(
        &self,
        id: IdentityId,
        status: ApprovalStatus,
        approved_by: Option<IdentityId>,
    ) -> Result<BusinessPartnerProfile, RepositoryError> {
        let mut businesses = lock(&self.businesses);
        let existing = businesses.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        existing.approval_status = status;
        if status == ApprovalStatus::Rejected {
            existing.approved_by = None;
            existing.approved_at = None;
        } else if let Some(approver) = approved_by {
            existing.approved_by = Some(approver);
            existing.approved_at = Some(Utc::now());
        }
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Fakes wired into a gateway and a coordinator.
pub struct Harness {
    pub provider: Arc<FakeIdentityProvider>,
    pub store: Arc<InMemoryProfileStore>,
    pub auth: AuthService<FakeIdentityProvider, InMemoryProfileStore>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        let provider = Arc::new(FakeIdentityProvider::new());
        let store = Arc::new(InMemoryProfileStore::new());
        let auth = AuthService::new(Arc::clone(&provider), Arc::clone(&store));
        Self {
            provider,
            store,
            auth,
        }
    }

    /// A coordinator over the same fakes. Must be called inside a runtime.
    #[must_use]
    pub fn coordinator(&self) -> SessionCoordinator<FakeIdentityProvider, InMemoryProfileStore> {
        SessionCoordinator::new(self.auth.clone())
    }

    /// Provider account plus profile row with `role`.
    pub fn seed_user(&self, address: &str, role: UserRole) -> IdentityId {
        let id = self.provider.add_account(address, STRONG_PASSWORD, true);
        self.store.insert_profile(profile(id, address, role));
        id
    }

    /// Business partner with a business account in `status`.
    pub fn seed_partner(&self, address: &str, status: ApprovalStatus) -> IdentityId {
        let id = self.seed_user(address, UserRole::BusinessPartner);
        self.store.insert_business(business_account(id, status));
        id
    }
}
