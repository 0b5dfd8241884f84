//! Relational store for storefront identities.
//!
//! # Database: schema `storefront`
//!
//! The identity provider owns credentials and sessions; this database owns
//! everything the storefront knows about a person beyond that:
//!
//! ## Tables
//!
//! - `profile` - One row per identity, keyed by the provider's user ID, carrying the role
//! - `business_account` - One row per business partner, keyed by identity ID
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p framecraft-cli -- migrate
//! ```

pub mod profiles;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use framecraft_core::{ApprovalStatus, IdentityId};

use crate::models::{
    AuthenticatedIdentity, BusinessPartnerProfile, NewBusinessProfile, NewProfile, ProfileUpdate,
};

pub use profiles::ProfileRepository;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate profile).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Row-level access to profiles and business accounts.
///
/// [`ProfileRepository`] implements this over `PostgreSQL`; tests substitute
/// an in-memory store.
pub trait ProfileStore: Send + Sync + 'static {
    /// Fetch a profile by identity ID.
    fn get_profile(
        &self,
        id: IdentityId,
    ) -> impl Future<Output = Result<Option<AuthenticatedIdentity>, RepositoryError>> + Send;

    /// Insert a new profile row.
    fn create_profile(
        &self,
        profile: &NewProfile,
    ) -> impl Future<Output = Result<AuthenticatedIdentity, RepositoryError>> + Send;

    /// Apply a partial update. `NotFound` if the profile does not exist.
    fn update_profile(
        &self,
        id: IdentityId,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<AuthenticatedIdentity, RepositoryError>> + Send;

    /// Stamp `last_login_at`. `NotFound` if the profile does not exist.
    fn record_login(
        &self,
        id: IdentityId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<AuthenticatedIdentity, RepositoryError>> + Send;

    /// Fetch the business account for an identity.
    fn get_business_profile(
        &self,
        id: IdentityId,
    ) -> impl Future<Output = Result<Option<BusinessPartnerProfile>, RepositoryError>> + Send;

    /// Insert a new business account in `pending` status.
    fn create_business_profile(
        &self,
        profile: &NewBusinessProfile,
    ) -> impl Future<Output = Result<BusinessPartnerProfile, RepositoryError>> + Send;

    /// Move a business account to `status`. When `approved_by` is given it is
    /// recorded together with the current time; moving to `Rejected` clears
    /// any earlier approval. `NotFound` if the account does not exist.
    fn set_approval_status(
        &self,
        id: IdentityId,
        status: ApprovalStatus,
        approved_by: Option<IdentityId>,
    ) -> impl Future<Output = Result<BusinessPartnerProfile, RepositoryError>> + Send;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map insert failures, turning constraint violations into `Conflict`.
fn map_write_error(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
    {
        return RepositoryError::Conflict(format!("{what}: {}", db_err.message()));
    }
    RepositoryError::Database(e)
}
