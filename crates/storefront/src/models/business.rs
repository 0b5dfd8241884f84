//! Business partner (B2B) account types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use framecraft_core::{ApprovalStatus, Email, IdentityId};

/// Structured business address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessAddress {
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub zip: String,
    pub country: String,
}

/// Extension record for identities with the business partner role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessPartnerProfile {
    /// The owning identity (one business account per identity).
    pub identity_id: IdentityId,
    pub company_name: String,
    pub business_type: Option<String>,
    pub tax_id: Option<String>,
    pub address: BusinessAddress,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<Email>,
    /// Maximum outstanding balance on account terms.
    pub credit_limit: Decimal,
    /// Net payment terms in days.
    pub payment_terms_days: i32,
    /// Discount off retail pricing, in percent.
    pub discount_percentage: Decimal,
    pub approval_status: ApprovalStatus,
    /// Admin who last approved the account.
    pub approved_by: Option<IdentityId>,
    pub approved_at: Option<DateTime<Utc>>,
    /// References to uploaded verification documents.
    pub verification_documents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BusinessPartnerProfile {
    /// Whether partner pricing is unlocked for this account.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        self.approval_status.grants_partner_pricing()
    }
}

/// Business account row to insert during partner registration.
///
/// Credit limit, payment terms and discount take the store defaults; only an
/// admin changes them after approval.
#[derive(Debug, Clone)]
pub struct NewBusinessProfile {
    pub identity_id: IdentityId,
    pub company_name: String,
    pub business_type: Option<String>,
    pub tax_id: Option<String>,
    pub address: BusinessAddress,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<Email>,
}
