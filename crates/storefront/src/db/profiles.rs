//! Profile repository for database operations.
//!
//! Queries are built at runtime (`sqlx::query_as`) against the `storefront`
//! schema; rows are mapped into domain types here so that nothing above this
//! layer sees a database row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use framecraft_core::{ApprovalStatus, Email, IdentityId, UserRole};

use super::{ProfileStore, RepositoryError, map_write_error};
use crate::models::{
    AuthenticatedIdentity, BusinessAddress, BusinessPartnerProfile, NewBusinessProfile,
    NewProfile, ProfileUpdate,
};

const PROFILE_COLUMNS: &str = "id, email, full_name, phone, role, is_active, email_verified, \
     phone_verified, avatar_url, last_login_at, created_at, updated_at";

const BUSINESS_COLUMNS: &str = "identity_id, company_name, business_type, tax_id, street, city, \
     state, zip, country, contact_person, contact_phone, contact_email, credit_limit, \
     payment_terms_days, discount_percentage, approval_status, approved_by, approved_at, \
     verification_documents, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: IdentityId,
    email: String,
    full_name: Option<String>,
    phone: Option<String>,
    role: UserRole,
    is_active: bool,
    email_verified: bool,
    phone_verified: bool,
    avatar_url: Option<String>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for AuthenticatedIdentity {
    type Error = RepositoryError;

    fn try_from(r: ProfileRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&r.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: r.id,
            email,
            full_name: r.full_name,
            phone: r.phone,
            role: r.role,
            is_active: r.is_active,
            email_verified: r.email_verified,
            phone_verified: r.phone_verified,
            avatar_url: r.avatar_url,
            last_login_at: r.last_login_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BusinessRow {
    identity_id: IdentityId,
    company_name: String,
    business_type: Option<String>,
    tax_id: Option<String>,
    street: String,
    city: String,
    state: Option<String>,
    zip: String,
    country: String,
    contact_person: Option<String>,
    contact_phone: Option<String>,
    contact_email: Option<String>,
    credit_limit: Decimal,
    payment_terms_days: i32,
    discount_percentage: Decimal,
    approval_status: ApprovalStatus,
    approved_by: Option<IdentityId>,
    approved_at: Option<DateTime<Utc>>,
    verification_documents: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BusinessRow> for BusinessPartnerProfile {
    type Error = RepositoryError;

    fn try_from(r: BusinessRow) -> Result<Self, Self::Error> {
        let contact_email = r
            .contact_email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid contact email in database: {e}"))
            })?;

        Ok(Self {
            identity_id: r.identity_id,
            company_name: r.company_name,
            business_type: r.business_type,
            tax_id: r.tax_id,
            address: BusinessAddress {
                street: r.street,
                city: r.city,
                state: r.state,
                zip: r.zip,
                country: r.country,
            },
            contact_person: r.contact_person,
            contact_phone: r.contact_phone,
            contact_email,
            credit_limit: r.credit_limit,
            payment_terms_days: r.payment_terms_days,
            discount_percentage: r.discount_percentage,
            approval_status: r.approval_status,
            approved_by: r.approved_by,
            approved_at: r.approved_at,
            verification_documents: r.verification_documents,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Repository for profile and business-account rows.
///
/// Cheap to clone; the pool is reference counted.
#[derive(Clone)]
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    /// Create a new profile repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List business accounts awaiting review, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_pending_partners(&self) -> Result<Vec<BusinessPartnerProfile>, RepositoryError> {
        let rows: Vec<BusinessRow> = sqlx::query_as(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM storefront.business_account \
             WHERE approval_status = 'pending' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

impl ProfileStore for ProfileRepository {
    async fn get_profile(
        &self,
        id: IdentityId,
    ) -> Result<Option<AuthenticatedIdentity>, RepositoryError> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM storefront.profile WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create_profile(
        &self,
        profile: &NewProfile,
    ) -> Result<AuthenticatedIdentity, RepositoryError> {
        let row: ProfileRow = sqlx::query_as(&format!(
            "INSERT INTO storefront.profile (id, email, full_name, phone, role, email_verified) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(profile.id)
        .bind(profile.email.as_str())
        .bind(profile.full_name.as_deref())
        .bind(profile.phone.as_deref())
        .bind(profile.role)
        .bind(profile.email_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "profile"))?;

        row.try_into()
    }

    async fn update_profile(
        &self,
        id: IdentityId,
        update: &ProfileUpdate,
    ) -> Result<AuthenticatedIdentity, RepositoryError> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "UPDATE storefront.profile SET \
                 full_name = COALESCE($2, full_name), \
                 phone = COALESCE($3, phone), \
                 avatar_url = COALESCE($4, avatar_url), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(id)
        .bind(update.full_name.as_deref())
        .bind(update.phone.as_deref())
        .bind(update.avatar_url.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn record_login(
        &self,
        id: IdentityId,
        at: DateTime<Utc>,
    ) -> Result<AuthenticatedIdentity, RepositoryError> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "UPDATE storefront.profile SET last_login_at = $2 \
             WHERE id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn get_business_profile(
        &self,
        id: IdentityId,
    ) -> Result<Option<BusinessPartnerProfile>, RepositoryError> {
        let row: Option<BusinessRow> = sqlx::query_as(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM storefront.business_account WHERE identity_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create_business_profile(
        &self,
        profile: &NewBusinessProfile,
    ) -> Result<BusinessPartnerProfile, RepositoryError> {
        let row: BusinessRow = sqlx::query_as(&format!(
            "INSERT INTO storefront.business_account \
                 (identity_id, company_name, business_type, tax_id, street, city, state, zip, \
                  country, contact_person, contact_phone, contact_email) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {BUSINESS_COLUMNS}"
        ))
        .bind(profile.identity_id)
        .bind(&profile.company_name)
        .bind(profile.business_type.as_deref())
        .bind(profile.tax_id.as_deref())
        .bind(&profile.address.street)
        .bind(&profile.address.city)
        .bind(profile.address.state.as_deref())
        .bind(&profile.address.zip)
        .bind(&profile.address.country)
        .bind(profile.contact_person.as_deref())
        .bind(profile.contact_phone.as_deref())
        .bind(profile.contact_email.as_ref().map(Email::as_str))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "business account"))?;

        row.try_into()
    }

    async fn set_approval_status(
        &self,
        id: IdentityId,
        status: ApprovalStatus,
        approved_by: Option<IdentityId>,
    ) -> Result<BusinessPartnerProfile, RepositoryError> {
        let row: Option<BusinessRow> = sqlx::query_as(&format!(
            "UPDATE storefront.business_account SET \
                 approval_status = $2, \
                 approved_by = CASE WHEN $4 THEN NULL ELSE COALESCE($3, approved_by) END, \
                 approved_at = CASE \
                     WHEN $4 THEN NULL \
                     WHEN $3 IS NULL THEN approved_at \
                     ELSE now() END, \
                 updated_at = now() \
             WHERE identity_id = $1 \
             RETURNING {BUSINESS_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(approved_by)
        .bind(status == ApprovalStatus::Rejected)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }
}
