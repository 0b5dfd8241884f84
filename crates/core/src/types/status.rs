//! Role and approval status enums.
//!
//! Roles are a closed tag set rather than a type hierarchy: every check over
//! them is an exhaustive `match`, so adding a role forces every predicate to be
//! revisited.

use serde::{Deserialize, Serialize};

/// The role attached to every storefront identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Retail (B2C) customer. The role every identity gets unless told otherwise.
    #[default]
    IndividualCustomer,
    /// Wholesale (B2B) account; partner pricing requires admin approval.
    BusinessPartner,
    /// Store staff with access to partner approvals.
    Admin,
    /// Store owner; everything an admin can do.
    SuperAdmin,
}

impl UserRole {
    /// All roles, in privilege order.
    pub const ALL: [Self; 4] = [
        Self::IndividualCustomer,
        Self::BusinessPartner,
        Self::Admin,
        Self::SuperAdmin,
    ];

    /// Whether the role carries staff privileges.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        match self {
            Self::Admin | Self::SuperAdmin => true,
            Self::IndividualCustomer | Self::BusinessPartner => false,
        }
    }

    /// The stored string form of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IndividualCustomer => "individual_customer",
            Self::BusinessPartner => "business_partner",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "individual_customer" => Ok(Self::IndividualCustomer),
            "business_partner" => Ok(Self::BusinessPartner),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

/// Approval state of a business partner account.
///
/// `pending -> approved | rejected`, and `approved -> suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.approval_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting review by an admin.
    #[default]
    Pending,
    /// Approved; the only status that unlocks partner pricing.
    Approved,
    /// Previously approved, temporarily disabled.
    Suspended,
    /// Application declined.
    Rejected,
}

impl ApprovalStatus {
    /// Whether this status unlocks partner pricing.
    #[must_use]
    pub const fn grants_partner_pricing(self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Whether an admin has already decided on this account.
    #[must_use]
    pub const fn is_finalized(self) -> bool {
        match self {
            Self::Approved | Self::Rejected => true,
            Self::Pending | Self::Suspended => false,
        }
    }

    /// The stored string form of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Suspended => "suspended",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "suspended" => Ok(Self::Suspended),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("invalid approval status: {s}")),
        }
    }
}
