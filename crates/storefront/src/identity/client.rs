//! HTTP client for a GoTrue-compatible identity provider.
//!
//! All endpoints live under `{IDENTITY_URL}/auth/v1/`. Every request carries
//! the project's anon key in the `apikey` header; session-scoped requests add
//! `Authorization: Bearer <access token>`.
//!
//! # OAuth Flow
//!
//! 1. `authorize_url()` creates a PKCE verifier and returns the provider URL
//! 2. The caller redirects the customer there
//! 3. The provider redirects back to `{STOREFRONT_BASE_URL}/auth/callback?code=...`
//! 4. `exchange_code_for_session()` trades the code and verifier for a session

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, instrument, warn};
use url::Url;

use framecraft_core::Email;

use super::types::{ErrorBody, SignUpResponse};
use super::{
    AuthChangeEvent, AuthEvent, IdentityError, IdentityProvider, OAuthProvider, ProviderSession,
    ProviderUser, SignOutScope, SignUpOutcome,
};
use crate::config::IdentityConfig;

/// Refresh the access token when it expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Capacity of the session-event channel.
const EVENT_CAPACITY: usize = 32;

/// Path the provider redirects back to after OAuth and email links.
const CALLBACK_PATH: &str = "auth/callback";

/// Client for the identity provider's auth API.
///
/// Holds the current session in memory; clones share it.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    http: reqwest::Client,
    auth_url: Url,
    anon_key: SecretString,
    callback_url: Url,
    session: RwLock<Option<ProviderSession>>,
    pkce_verifier: Mutex<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl IdentityClient {
    /// Create a new identity client.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Config` if the base URL cannot be extended or
    /// the HTTP client cannot be built.
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("framecraft-storefront/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IdentityError::Config(format!("HTTP client: {e}")))?;

        let auth_url = with_trailing_slash(&config.url)
            .join("auth/v1/")
            .map_err(|e| IdentityError::Config(format!("IDENTITY_URL: {e}")))?;
        let callback_url = with_trailing_slash(&config.redirect_url)
            .join(CALLBACK_PATH)
            .map_err(|e| IdentityError::Config(format!("STOREFRONT_BASE_URL: {e}")))?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(IdentityClientInner {
                http,
                auth_url,
                anon_key: config.anon_key.clone(),
                callback_url,
                session: RwLock::new(None),
                pkce_verifier: Mutex::new(None),
                events,
            }),
        })
    }

    /// The current session, if any (for persisting between CLI runs).
    pub async fn current_session(&self) -> Option<ProviderSession> {
        self.inner.session.read().await.clone()
    }

    /// Adopt a previously persisted session without emitting events.
    ///
    /// The session is refreshed lazily on first use if it is near expiry.
    pub async fn restore_session(&self, session: ProviderSession) {
        let session = session.anchored(Utc::now());
        debug!(user_id = %session.user.id, "Restored identity session");
        *self.inner.session.write().await = Some(session);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request plumbing
    // ─────────────────────────────────────────────────────────────────────────

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.inner
            .auth_url
            .join(path)
            .map_err(|e| IdentityError::Config(format!("endpoint {path}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
    }

    fn emit(&self, kind: AuthChangeEvent, session: Option<ProviderSession>) {
        if self.inner.events.send(AuthEvent::new(kind, session)).is_err() {
            debug!(?kind, "No auth event subscribers");
        }
    }

    /// POST `/token?grant_type=...` and return the anchored session.
    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<ProviderSession, IdentityError> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let session: ProviderSession = send_json(self.request(Method::POST, url).json(&body)).await?;
        Ok(session.anchored(Utc::now()))
    }

    async fn store_session(&self, session: &ProviderSession) {
        *self.inner.session.write().await = Some(session.clone());
    }

    /// Access token for the current session, refreshing it when it is close
    /// to expiry.
    async fn access_token(&self) -> Result<String, IdentityError> {
        if let Some(session) = self.inner.session.read().await.as_ref()
            && !session.expires_within(REFRESH_MARGIN_SECS, Utc::now())
        {
            return Ok(session.access_token.clone());
        }

        // Holding the write lock serializes concurrent refreshes so the
        // single-use refresh token is spent once.
        let mut guard = self.inner.session.write().await;
        let Some(current) = guard.as_ref() else {
            return Err(IdentityError::NoSession);
        };
        if !current.expires_within(REFRESH_MARGIN_SECS, Utc::now()) {
            return Ok(current.access_token.clone());
        }

        let refresh_token = current.refresh_token.clone();
        match self
            .token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(session) => {
                let token = session.access_token.clone();
                *guard = Some(session.clone());
                drop(guard);
                debug!(user_id = %session.user.id, "Identity session refreshed");
                self.emit(AuthChangeEvent::TokenRefreshed, Some(session));
                Ok(token)
            }
            Err(e @ IdentityError::Rejected { .. }) => {
                *guard = None;
                drop(guard);
                warn!(error = %e, "Session refresh rejected, signing out locally");
                self.emit(AuthChangeEvent::SignedOut, None);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

impl IdentityProvider for IdentityClient {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<ProviderSession, IdentityError> {
        let session = self
            .token_request(
                "password",
                json!({ "email": email.as_str(), "password": password }),
            )
            .await?;

        self.store_session(&session).await;
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    #[instrument(skip(self, password, metadata), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<SignUpOutcome, IdentityError> {
        let mut url = self.endpoint("signup")?;
        url.query_pairs_mut()
            .append_pair("redirect_to", self.inner.callback_url.as_str());

        let body = json!({ "email": email.as_str(), "password": password, "data": metadata });
        let response: SignUpResponse = send_json(self.request(Method::POST, url).json(&body)).await?;

        let mut outcome = SignUpOutcome::from(response);
        if let Some(session) = outcome.session.take() {
            let session = session.anchored(Utc::now());
            self.store_session(&session).await;
            self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
            outcome.session = Some(session);
        } else {
            debug!(user_id = %outcome.user.id, "Sign-up awaiting email confirmation");
        }
        Ok(outcome)
    }

    async fn authorize_url(&self, provider: OAuthProvider) -> Result<Url, IdentityError> {
        let verifier = generate_code_verifier();
        let challenge = code_challenge(&verifier);

        let mut url = self.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", self.inner.callback_url.as_str())
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "s256");

        *self.inner.pkce_verifier.lock().await = Some(verifier);
        debug!(%provider, "Prepared OAuth authorization URL");
        Ok(url)
    }

    #[instrument(skip_all)]
    async fn exchange_code_for_session(&self, code: &str) -> Result<ProviderSession, IdentityError> {
        let verifier = self
            .inner
            .pkce_verifier
            .lock()
            .await
            .take()
            .ok_or_else(|| IdentityError::OAuth("no OAuth sign-in in progress".to_owned()))?;

        let session = self
            .token_request(
                "pkce",
                json!({ "auth_code": code, "code_verifier": verifier }),
            )
            .await?;

        self.store_session(&session).await;
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), IdentityError> {
        let previous = self.inner.session.write().await.take();

        let result = match previous {
            Some(session) => match self.endpoint("logout") {
                Ok(mut url) => {
                    url.query_pairs_mut().append_pair("scope", scope.as_str());
                    send_empty(
                        self.request(Method::POST, url)
                            .bearer_auth(&session.access_token),
                    )
                    .await
                }
                Err(e) => Err(e),
            },
            None => Ok(()),
        };

        self.emit(AuthChangeEvent::SignedOut, None);
        result
    }

    async fn current_user(&self) -> Result<Option<ProviderUser>, IdentityError> {
        let token = match self.access_token().await {
            Ok(token) => token,
            Err(IdentityError::NoSession) => return Ok(None),
            Err(e) => return Err(e),
        };

        let user: ProviderUser =
            send_json(self.request(Method::GET, self.endpoint("user")?).bearer_auth(token)).await?;
        Ok(Some(user))
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn request_password_reset(&self, email: &Email) -> Result<(), IdentityError> {
        let mut url = self.endpoint("recover")?;
        url.query_pairs_mut()
            .append_pair("redirect_to", self.inner.callback_url.as_str());

        send_empty(
            self.request(Method::POST, url)
                .json(&json!({ "email": email.as_str() })),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn update_password(&self, password: &str) -> Result<ProviderUser, IdentityError> {
        let token = self.access_token().await?;

        let user: ProviderUser = send_json(
            self.request(Method::PUT, self.endpoint("user")?)
                .bearer_auth(token)
                .json(&json!({ "password": password })),
        )
        .await?;

        let updated = {
            let mut guard = self.inner.session.write().await;
            if let Some(session) = guard.as_mut() {
                session.user = user.clone();
            }
            guard.clone()
        };
        self.emit(AuthChangeEvent::UserUpdated, updated);
        Ok(user)
    }

    #[instrument(skip_all)]
    async fn verify_email(&self, token: &str) -> Result<(), IdentityError> {
        let response: SignUpResponse = send_json(
            self.request(Method::POST, self.endpoint("verify")?)
                .json(&json!({ "type": "email", "token_hash": token })),
        )
        .await?;

        if let SignUpResponse::Session(session) = response {
            let session = session.anchored(Utc::now());
            self.store_session(&session).await;
            self.emit(AuthChangeEvent::SignedIn, Some(session));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn resend_verification(&self, email: &Email) -> Result<(), IdentityError> {
        send_empty(
            self.request(Method::POST, self.endpoint("resend")?)
                .json(&json!({ "type": "signup", "email": email.as_str() })),
        )
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Send a request and decode a JSON body, mapping non-2xx into `Rejected`.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, IdentityError> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(rejection(status, &text));
    }

    Ok(serde_json::from_str(&text)?)
}

/// Send a request whose success body is irrelevant.
async fn send_empty(request: RequestBuilder) -> Result<(), IdentityError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(rejection(status, &text));
    }
    Ok(())
}

fn rejection(status: reqwest::StatusCode, body: &str) -> IdentityError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("identity provider error")
                .to_owned()
        });

    IdentityError::Rejected {
        status: status.as_u16(),
        message,
    }
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Random PKCE code verifier (43 URL-safe characters).
fn generate_code_verifier() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

/// S256 code challenge for a verifier.
fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
