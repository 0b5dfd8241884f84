//! Integration tests for the identity gateway (`AuthService`).
//!
//! These run the gateway against the in-memory identity provider and profile
//! store, covering sign-in, registration, profile updates and partner
//! approval without a network or database.

#![allow(clippy::unwrap_used)]

use framecraft_core::{ApprovalStatus, IdentityId, UserRole};
use framecraft_integration_tests::{Harness, STRONG_PASSWORD, provider_user};
use framecraft_storefront::AuthError;
use framecraft_storefront::identity::OAuthProvider;
use framecraft_storefront::models::{BusinessAddress, ProfileUpdate};
use framecraft_storefront::services::auth::{
    BusinessRegistration, IndividualRegistration, RegistrationStage,
};

fn individual_form(email: &str) -> IndividualRegistration {
    IndividualRegistration {
        email: email.to_owned(),
        password: STRONG_PASSWORD.to_owned(),
        confirm_password: STRONG_PASSWORD.to_owned(),
        full_name: "  Ada Frame  ".to_owned(),
        phone: Some("+1 503 555 0100".to_owned()),
    }
}

fn business_form(email: &str) -> BusinessRegistration {
    BusinessRegistration {
        account: individual_form(email),
        company_name: "Frame & Co".to_owned(),
        business_type: Some("gallery".to_owned()),
        tax_id: Some("12-3456789".to_owned()),
        address: BusinessAddress {
            street: "1 Gallery Row".to_owned(),
            city: "Portland".to_owned(),
            state: Some("OR".to_owned()),
            zip: "97201".to_owned(),
            country: "US".to_owned(),
        },
        contact_person: None,
        contact_phone: None,
        contact_email: Some("orders@frameandco.com".to_owned()),
    }
}

// =============================================================================
// Sign-in
// =============================================================================

#[tokio::test]
async fn test_authenticate_stamps_login() {
    let h = Harness::new();
    let id = h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);

    let outcome = h
        .auth
        .authenticate("ada@framecraft.shop", STRONG_PASSWORD)
        .await
        .unwrap();

    assert_eq!(outcome.identity.id, id);
    assert!(outcome.identity.last_login_at.is_some());
    assert!(outcome.identity.email_verified, "provider confirmation is folded in");
    assert!(outcome.business_profile.is_none());
    assert_eq!(h.store.record_login_calls(), 1);
}

#[tokio::test]
async fn test_authenticate_wrong_password() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);

    let err = h
        .auth
        .authenticate("ada@framecraft.shop", "Wrong1password")
        .await
        .unwrap_err();

    assert!(matches!(&err, AuthError::ProviderRejected(m) if m == "Invalid login credentials"));
    assert_eq!(h.store.record_login_calls(), 0);
}

#[tokio::test]
async fn test_authenticate_invalid_email_never_reaches_provider() {
    let h = Harness::new();

    let err = h.auth.authenticate("not-an-email", STRONG_PASSWORD).await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidEmail(_)));
    assert_eq!(h.provider.sign_in_calls(), 0);
}

#[tokio::test]
async fn test_authenticate_without_profile_row() {
    let h = Harness::new();
    let id = h
        .provider
        .add_account("orphan@framecraft.shop", STRONG_PASSWORD, true);

    let err = h
        .auth
        .authenticate("orphan@framecraft.shop", STRONG_PASSWORD)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ProfileNotFound(missing) if missing == id));
}

#[tokio::test]
async fn test_partner_sign_in_includes_business_account() {
    let h = Harness::new();
    let id = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Approved);

    let outcome = h
        .auth
        .authenticate("buyer@frameandco.com", STRONG_PASSWORD)
        .await
        .unwrap();

    let business = outcome.business_profile.unwrap();
    assert_eq!(business.identity_id, id);
    assert!(business.is_approved());
}

#[tokio::test]
async fn test_admin_sign_in_has_no_business_account() {
    let h = Harness::new();
    h.seed_user("owner@framecraft.shop", UserRole::Admin);

    let outcome = h
        .auth
        .authenticate("owner@framecraft.shop", STRONG_PASSWORD)
        .await
        .unwrap();

    assert_eq!(outcome.identity.role, UserRole::Admin);
    assert!(outcome.business_profile.is_none());
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_individual_creates_profile() {
    let h = Harness::new();

    let identity = h
        .auth
        .register_individual(&individual_form("new@framecraft.shop"))
        .await
        .unwrap();

    assert_eq!(identity.role, UserRole::IndividualCustomer);
    assert_eq!(identity.full_name.as_deref(), Some("Ada Frame"));
    assert!(!identity.email_verified);
    assert_eq!(h.store.profile(identity.id).unwrap().email.as_str(), "new@framecraft.shop");

    let user = h.provider.user("new@framecraft.shop").unwrap();
    assert_eq!(user.id, identity.id);
    assert_eq!(user.user_metadata["role"], "individual_customer");
    assert_eq!(user.user_metadata["full_name"], "Ada Frame");
}

#[tokio::test]
async fn test_register_individual_reports_every_field() {
    let h = Harness::new();
    let form = IndividualRegistration {
        email: "nope".to_owned(),
        password: "abc".to_owned(),
        confirm_password: "abd".to_owned(),
        full_name: "   ".to_owned(),
        phone: None,
    };

    let err = h.auth.register_individual(&form).await.unwrap_err();

    let AuthError::Validation(errors) = err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert_eq!(errors.codes_for("email"), vec!["invalid_email"]);
    assert_eq!(
        errors.codes_for("password"),
        vec!["too_short", "missing_uppercase", "missing_digit"]
    );
    assert_eq!(errors.codes_for("confirm_password"), vec!["mismatch"]);
    assert_eq!(errors.codes_for("full_name"), vec!["required"]);
    assert_eq!(h.provider.sign_up_calls(), 0);
}

#[tokio::test]
async fn test_register_duplicate_email_is_provider_rejection() {
    let h = Harness::new();
    h.seed_user("taken@framecraft.shop", UserRole::IndividualCustomer);

    let err = h
        .auth
        .register_individual(&individual_form("taken@framecraft.shop"))
        .await
        .unwrap_err();

    assert!(matches!(&err, AuthError::ProviderRejected(m) if m == "User already registered"));
    assert_eq!(h.store.profile_count(), 1);
}

#[tokio::test]
async fn test_register_profile_failure_is_incomplete() {
    let h = Harness::new();
    h.store.fail_profile_inserts();

    let err = h
        .auth
        .register_individual(&individual_form("half@framecraft.shop"))
        .await
        .unwrap_err();

    let user = h.provider.user("half@framecraft.shop").unwrap();
    assert!(matches!(
        &err,
        AuthError::IncompleteRegistration { identity_id, stage: RegistrationStage::Profile, .. }
            if *identity_id == user.id
    ));
    assert!(err.is_infrastructure());
}

#[tokio::test]
async fn test_register_business_partner_starts_pending() {
    let h = Harness::new();

    let outcome = h
        .auth
        .register_business_partner(&business_form("buyer@frameandco.com"))
        .await
        .unwrap();

    assert_eq!(outcome.identity.role, UserRole::BusinessPartner);
    let business = outcome.business_profile.unwrap();
    assert_eq!(business.identity_id, outcome.identity.id);
    assert_eq!(business.approval_status, ApprovalStatus::Pending);
    assert_eq!(business.payment_terms_days, 30);
    assert!(business.approved_by.is_none());
    assert_eq!(
        business.contact_email.map(|e| e.as_str().to_owned()).as_deref(),
        Some("orders@frameandco.com")
    );

    let user = h.provider.user("buyer@frameandco.com").unwrap();
    assert_eq!(user.user_metadata["company_name"], "Frame & Co");
}

#[tokio::test]
async fn test_register_business_account_failure_is_incomplete() {
    let h = Harness::new();
    h.store.fail_business_inserts();

    let err = h
        .auth
        .register_business_partner(&business_form("buyer@frameandco.com"))
        .await
        .unwrap_err();

    let AuthError::IncompleteRegistration {
        identity_id, stage, ..
    } = err
    else {
        panic!("expected incomplete registration, got {err:?}");
    };
    assert_eq!(stage, RegistrationStage::BusinessAccount);
    assert!(h.store.profile(identity_id).is_some(), "profile row stays behind");
    assert!(h.store.business(identity_id).is_none());
}

#[tokio::test]
async fn test_register_business_weak_password_is_local() {
    let h = Harness::new();
    let mut form = business_form("buyer@frameandco.com");
    form.account.password = "abc".to_owned();
    form.account.confirm_password = "abc".to_owned();

    let err = h.auth.register_business_partner(&form).await.unwrap_err();

    let AuthError::Validation(errors) = err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert_eq!(
        errors.codes_for("password"),
        vec!["too_short", "missing_uppercase", "missing_digit"]
    );
    assert!(errors.codes_for("confirm_password").is_empty());
    assert_eq!(h.provider.sign_up_calls(), 0);
    assert_eq!(h.store.profile_count(), 0);
}

#[tokio::test]
async fn test_register_business_validation_covers_address() {
    let h = Harness::new();
    let mut form = business_form("buyer@frameandco.com");
    form.company_name = String::new();
    form.address.city = String::new();
    form.tax_id = Some("12/34".to_owned());

    let err = h.auth.register_business_partner(&form).await.unwrap_err();

    let AuthError::Validation(errors) = err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert_eq!(errors.codes_for("company_name"), vec!["required"]);
    assert_eq!(errors.codes_for("address.city"), vec!["required"]);
    assert_eq!(errors.codes_for("tax_id"), vec!["invalid_tax_id"]);
    assert_eq!(h.provider.sign_up_calls(), 0);
}

// =============================================================================
// External sign-in
// =============================================================================

#[tokio::test]
async fn test_external_sign_in_provisions_profile() {
    let h = Harness::new();
    let id = IdentityId::random();
    let mut user = provider_user(id, "oauth@framecraft.shop", true);
    user.user_metadata = serde_json::json!({ "name": "Grace Gallery" });
    h.provider.add_oauth_code("code-123", user);

    let url = h
        .auth
        .authenticate_with_external_provider(OAuthProvider::Google)
        .await
        .unwrap();
    assert!(url.as_str().contains("provider=google"));

    let outcome = h.auth.complete_external_sign_in("code-123").await.unwrap();

    assert_eq!(outcome.identity.id, id);
    assert_eq!(outcome.identity.role, UserRole::IndividualCustomer);
    assert_eq!(outcome.identity.full_name.as_deref(), Some("Grace Gallery"));
    assert!(outcome.identity.email_verified);
    assert!(outcome.identity.last_login_at.is_some());
}

#[tokio::test]
async fn test_external_sign_in_keeps_existing_profile() {
    let h = Harness::new();
    let id = h.seed_user("owner@framecraft.shop", UserRole::Admin);
    h.provider
        .add_oauth_code("code-456", provider_user(id, "owner@framecraft.shop", true));

    h.auth
        .authenticate_with_external_provider(OAuthProvider::Github)
        .await
        .unwrap();
    let outcome = h.auth.complete_external_sign_in("code-456").await.unwrap();

    assert_eq!(outcome.identity.role, UserRole::Admin);
    assert_eq!(h.store.profile_count(), 1);
}

#[tokio::test]
async fn test_external_sign_in_with_unknown_code() {
    let h = Harness::new();
    h.auth
        .authenticate_with_external_provider(OAuthProvider::Google)
        .await
        .unwrap();

    let err = h.auth.complete_external_sign_in("bogus").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderRejected(_)));
}

// =============================================================================
// Current identity & profile
// =============================================================================

#[tokio::test]
async fn test_fetch_current_identity_without_session() {
    let h = Harness::new();
    assert!(h.auth.fetch_current_identity().await.unwrap().is_none());
    assert!(h.auth.fetch_current_outcome().await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_current_outcome_for_partner() {
    let h = Harness::new();
    let id = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);
    h.provider.sign_in_elsewhere("buyer@frameandco.com");

    let outcome = h.auth.fetch_current_outcome().await.unwrap().unwrap();

    assert_eq!(outcome.identity.id, id);
    assert_eq!(
        outcome.business_profile.unwrap().approval_status,
        ApprovalStatus::Pending
    );
}

#[tokio::test]
async fn test_update_profile_requires_session() {
    let h = Harness::new();
    let update = ProfileUpdate {
        full_name: Some("Ada".to_owned()),
        ..ProfileUpdate::default()
    };

    let err = h.auth.update_profile(&update).await.unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

#[tokio::test]
async fn test_update_profile_applies_changes() {
    let h = Harness::new();
    let id = h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.provider.sign_in_elsewhere("ada@framecraft.shop");

    let update = ProfileUpdate {
        full_name: Some("Ada Lovelace".to_owned()),
        phone: Some("+44 20 7946 0000".to_owned()),
        avatar_url: None,
    };
    let identity = h.auth.update_profile(&update).await.unwrap();

    assert_eq!(identity.id, id);
    assert_eq!(identity.full_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(identity.phone.as_deref(), Some("+44 20 7946 0000"));
}

#[tokio::test]
async fn test_update_profile_rejects_bad_phone() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.provider.sign_in_elsewhere("ada@framecraft.shop");

    let update = ProfileUpdate {
        phone: Some("call me".to_owned()),
        ..ProfileUpdate::default()
    };
    let err = h.auth.update_profile(&update).await.unwrap_err();

    assert!(matches!(err, AuthError::Validation(_)));
}

// =============================================================================
// Password & verification
// =============================================================================

#[tokio::test]
async fn test_update_password_mismatch_checked_first() {
    let h = Harness::new();

    let err = h.auth.update_password("abc", "abd").await.unwrap_err();
    assert!(matches!(err, AuthError::PasswordMismatch));
}

#[tokio::test]
async fn test_update_password_mismatch_never_reaches_provider() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.provider.sign_in_elsewhere("ada@framecraft.shop");

    let err = h
        .auth
        .update_password("Abcd1234", "Abcd9999")
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::PasswordMismatch));
    assert_eq!(h.provider.update_password_calls(), 0);
    assert_eq!(
        h.provider.password_of("ada@framecraft.shop").as_deref(),
        Some(STRONG_PASSWORD)
    );
}

#[tokio::test]
async fn test_update_password_rejects_weak_password() {
    let h = Harness::new();

    let err = h.auth.update_password("lowercase1", "lowercase1").await.unwrap_err();
    let AuthError::Validation(errors) = err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert_eq!(errors.codes_for("password"), vec!["missing_uppercase"]);
}

#[tokio::test]
async fn test_update_password_without_session() {
    let h = Harness::new();

    let err = h
        .auth
        .update_password("Newer1frame", "Newer1frame")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

#[tokio::test]
async fn test_update_password_changes_credentials() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.provider.sign_in_elsewhere("ada@framecraft.shop");

    h.auth.update_password("Newer1frame", "Newer1frame").await.unwrap();

    assert_eq!(
        h.provider.password_of("ada@framecraft.shop").as_deref(),
        Some("Newer1frame")
    );
}

#[tokio::test]
async fn test_reset_password_request() {
    let h = Harness::new();

    h.auth.reset_password_request("ada@framecraft.shop").await.unwrap();
    assert_eq!(h.provider.reset_requests(), vec!["ada@framecraft.shop".to_owned()]);

    let err = h.auth.reset_password_request("ada").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidEmail(_)));
}

#[tokio::test]
async fn test_verify_email_with_expired_token() {
    let h = Harness::new();

    let err = h.auth.verify_email("stale").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderRejected(_)));
}

#[tokio::test]
async fn test_end_session_swallows_provider_failure() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.provider.sign_in_elsewhere("ada@framecraft.shop");
    h.provider.fail_sign_out();

    h.auth.end_session().await;

    assert!(h.provider.session().is_none());
    assert_eq!(h.provider.sign_out_calls(), 1);
}

// =============================================================================
// Partner approval
// =============================================================================

#[tokio::test]
async fn test_approve_records_approver() {
    let h = Harness::new();
    let admin = h.seed_user("owner@framecraft.shop", UserRole::Admin);
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);

    let approved = h.auth.approve_business_partner(partner, admin).await.unwrap();

    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert_eq!(approved.approved_by, Some(admin));
    assert!(approved.approved_at.is_some());
}

#[tokio::test]
async fn test_reject_then_approve_is_allowed() {
    let h = Harness::new();
    let admin = h.seed_user("owner@framecraft.shop", UserRole::Admin);
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);

    let rejected = h.auth.reject_business_partner(partner).await.unwrap();
    assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
    assert!(rejected.approved_by.is_none());

    let approved = h.auth.approve_business_partner(partner, admin).await.unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn test_reject_after_approval_clears_approver() {
    let h = Harness::new();
    let admin = h.seed_user("owner@framecraft.shop", UserRole::Admin);
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);
    h.auth.approve_business_partner(partner, admin).await.unwrap();

    let rejected = h.auth.reject_business_partner(partner).await.unwrap();

    assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
    assert!(rejected.approved_by.is_none());
    assert!(rejected.approved_at.is_none());
    let stored = h.store.business(partner).unwrap();
    assert!(stored.approved_by.is_none());
    assert!(stored.approved_at.is_none());
}

#[tokio::test]
async fn test_suspension_keeps_approval_record() {
    let h = Harness::new();
    let admin = h.seed_user("owner@framecraft.shop", UserRole::Admin);
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);
    h.auth.approve_business_partner(partner, admin).await.unwrap();

    let suspended = h.auth.suspend_business_partner(partner).await.unwrap();

    assert_eq!(suspended.approval_status, ApprovalStatus::Suspended);
    assert_eq!(suspended.approved_by, Some(admin));
}

#[tokio::test]
async fn test_suspend_requires_approved() {
    let h = Harness::new();
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);

    let err = h.auth.suspend_business_partner(partner).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::InvalidTransition {
            from: ApprovalStatus::Pending,
            to: ApprovalStatus::Suspended
        }
    ));
    assert_eq!(
        h.store.business(partner).unwrap().approval_status,
        ApprovalStatus::Pending
    );
}

#[tokio::test]
async fn test_suspend_approved_partner() {
    let h = Harness::new();
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Approved);

    let suspended = h.auth.suspend_business_partner(partner).await.unwrap();
    assert_eq!(suspended.approval_status, ApprovalStatus::Suspended);
    assert!(!suspended.is_approved());
}

#[tokio::test]
async fn test_approve_unknown_partner() {
    let h = Harness::new();
    let admin = h.seed_user("owner@framecraft.shop", UserRole::Admin);
    let stranger = IdentityId::random();

    let err = h
        .auth
        .approve_business_partner(stranger, admin)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PartnerNotFound(id) if id == stranger));
}
