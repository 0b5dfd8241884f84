//! Role predicates.
//!
//! Pure functions over the signed-in principal and its business account.
//! A missing principal satisfies no role.

use framecraft_core::{ApprovalStatus, UserRole};

use crate::models::{AuthenticatedIdentity, BusinessPartnerProfile};

#[must_use]
pub fn has_role(identity: Option<&AuthenticatedIdentity>, role: UserRole) -> bool {
    identity.is_some_and(|i| i.role == role)
}

#[must_use]
pub fn has_any_role(identity: Option<&AuthenticatedIdentity>, roles: &[UserRole]) -> bool {
    identity.is_some_and(|i| roles.contains(&i.role))
}

/// Admin or super admin.
#[must_use]
pub fn is_admin(identity: Option<&AuthenticatedIdentity>) -> bool {
    identity.is_some_and(|i| i.role.is_staff())
}

#[must_use]
pub fn is_business_partner(identity: Option<&AuthenticatedIdentity>) -> bool {
    has_role(identity, UserRole::BusinessPartner)
}

#[must_use]
pub fn is_individual_customer(identity: Option<&AuthenticatedIdentity>) -> bool {
    has_role(identity, UserRole::IndividualCustomer)
}

/// Wholesale pricing is visible only to business partners whose account has
/// been approved.
#[must_use]
pub fn can_view_partner_pricing(
    identity: Option<&AuthenticatedIdentity>,
    business: Option<&BusinessPartnerProfile>,
) -> bool {
    let Some(identity) = identity else {
        return false;
    };

    match identity.role {
        UserRole::BusinessPartner => business.is_some_and(|b| {
            b.identity_id == identity.id && b.approval_status == ApprovalStatus::Approved
        }),
        UserRole::IndividualCustomer | UserRole::Admin | UserRole::SuperAdmin => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use framecraft_core::{Email, IdentityId};

    use super::*;
    use crate::models::BusinessAddress;

    fn identity(role: UserRole) -> AuthenticatedIdentity {
        AuthenticatedIdentity {
            id: IdentityId::random(),
            email: Email::parse("buyer@frameandco.com").unwrap(),
            full_name: Some("Grace Gallery".to_owned()),
            phone: None,
            role,
            is_active: true,
            email_verified: true,
            phone_verified: false,
            avatar_url: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn business(owner: &AuthenticatedIdentity, status: ApprovalStatus) -> BusinessPartnerProfile {
        BusinessPartnerProfile {
            identity_id: owner.id,
            company_name: "Frame & Co".to_owned(),
            business_type: None,
            tax_id: None,
            address: BusinessAddress::default(),
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_approved_partner_sees_partner_pricing() {
        let partner = identity(UserRole::BusinessPartner);
        let profile = business(&partner, ApprovalStatus::Approved);
        assert!(can_view_partner_pricing(Some(&partner), Some(&profile)));
    }

    #[test]
    fn test_partner_pricing_negatives() {
        let partner = identity(UserRole::BusinessPartner);
        for status in [
            ApprovalStatus::Pending,
            ApprovalStatus::Suspended,
            ApprovalStatus::Rejected,
        ] {
            let profile = business(&partner, status);
            assert!(
                !can_view_partner_pricing(Some(&partner), Some(&profile)),
                "{status} partner must not see partner pricing"
            );
        }

        assert!(!can_view_partner_pricing(Some(&partner), None));

        for role in [UserRole::IndividualCustomer, UserRole::Admin, UserRole::SuperAdmin] {
            let other = identity(role);
            let profile = business(&other, ApprovalStatus::Approved);
            assert!(!can_view_partner_pricing(Some(&other), Some(&profile)));
        }

        assert!(!can_view_partner_pricing(None, None));
    }

    #[test]
    fn test_partner_pricing_requires_own_profile() {
        let partner = identity(UserRole::BusinessPartner);
        let someone_else = identity(UserRole::BusinessPartner);
        let profile = business(&someone_else, ApprovalStatus::Approved);
        assert!(!can_view_partner_pricing(Some(&partner), Some(&profile)));
    }

    #[test]
    fn test_has_any_staff_role() {
        let staff = [UserRole::Admin, UserRole::SuperAdmin];
        for role in UserRole::ALL {
            let expected = matches!(role, UserRole::Admin | UserRole::SuperAdmin);
            assert_eq!(has_any_role(Some(&identity(role)), &staff), expected, "{role}");
            assert_eq!(is_admin(Some(&identity(role))), expected, "{role}");
        }
        assert!(!has_any_role(None, &staff));
    }

    #[test]
    fn test_single_role_predicates() {
        let customer = identity(UserRole::IndividualCustomer);
        assert!(is_individual_customer(Some(&customer)));
        assert!(!is_business_partner(Some(&customer)));
        assert!(has_role(Some(&customer), UserRole::IndividualCustomer));
        assert!(!has_role(None, UserRole::IndividualCustomer));
    }
}
