//! Integration tests for the session coordinator.
//!
//! Covers the snapshot lifecycle, ordering of overlapping transitions and the
//! handling of session events published by the identity provider.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use framecraft_core::{ApprovalStatus, UserRole};
use framecraft_integration_tests::{
    FakeIdentityProvider, Harness, InMemoryProfileStore, STRONG_PASSWORD, profile,
};
use framecraft_storefront::identity::{AuthChangeEvent, OAuthProvider};
use framecraft_storefront::models::{ProfileUpdate, SessionPhase, SessionSnapshot};
use framecraft_storefront::services::auth::IndividualRegistration;
use framecraft_storefront::{AuthError, SessionCoordinator};

type Coordinator = SessionCoordinator<FakeIdentityProvider, InMemoryProfileStore>;

/// Wait (bounded) until the snapshot satisfies `predicate`.
async fn wait_for(
    coordinator: &Coordinator,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = coordinator.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("snapshot did not reach the expected state")
        .unwrap()
        .clone()
}

/// Give the event listener a chance to drain.
async fn drain_events() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_starts_uninitialized_and_loading() {
    let h = Harness::new();
    let c = h.coordinator();

    let snapshot = c.snapshot();
    assert!(snapshot.loading);
    assert!(!snapshot.initialized);
    assert_eq!(snapshot.phase(), SessionPhase::Uninitialized);
}

#[tokio::test]
async fn test_initialize_without_session() {
    let h = Harness::new();
    let c = h.coordinator();

    assert!(c.initialize().await.unwrap().is_none());

    let snapshot = c.snapshot();
    assert!(snapshot.initialized);
    assert!(!snapshot.loading);
    assert!(snapshot.identity.is_none());
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.phase(), SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn test_initialize_restores_existing_session() {
    let h = Harness::new();
    let id = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Approved);
    h.provider.sign_in_elsewhere("buyer@frameandco.com");

    let c = h.coordinator();
    c.initialize().await.unwrap();

    let snapshot = c.snapshot();
    assert_eq!(snapshot.identity.as_ref().map(|i| i.id), Some(id));
    assert!(snapshot.can_view_partner_pricing());
    assert_eq!(snapshot.phase(), SessionPhase::Authenticated);
}

#[tokio::test]
async fn test_initialize_failure_settles_unauthenticated() {
    let h = Harness::new();
    h.provider
        .add_account("orphan@framecraft.shop", STRONG_PASSWORD, true);
    h.provider.sign_in_elsewhere("orphan@framecraft.shop");

    let c = h.coordinator();
    let err = c.initialize().await.unwrap_err();

    assert!(matches!(err, AuthError::ProfileNotFound(_)));
    let snapshot = c.snapshot();
    assert!(snapshot.initialized);
    assert!(!snapshot.loading);
    assert!(snapshot.identity.is_none());
    assert!(snapshot.error.is_some());
}

// =============================================================================
// Sign-in and sign-out
// =============================================================================

#[tokio::test]
async fn test_login_commits_principal() {
    let h = Harness::new();
    let id = h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.initialize().await.unwrap();

    let outcome = c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();

    let snapshot = c.snapshot();
    assert_eq!(outcome.identity.id, id);
    assert_eq!(snapshot.identity, Some(outcome.identity));
    assert!(snapshot.business_profile.is_none());
    assert!(snapshot.error.is_none());
    assert!(!snapshot.loading);
    assert!(snapshot.is_individual_customer());
}

#[tokio::test]
async fn test_failed_login_keeps_previous_principal() {
    let h = Harness::new();
    let id = h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.seed_user("grace@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();

    let err = c
        .login("grace@framecraft.shop", "Wrong1password")
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ProviderRejected(_)));
    let snapshot = c.snapshot();
    assert_eq!(snapshot.identity.map(|i| i.id), Some(id));
    assert_eq!(snapshot.error.as_deref(), Some("Invalid login credentials"));
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn test_clear_error() {
    let h = Harness::new();
    let c = h.coordinator();
    c.initialize().await.unwrap();

    let _ = c.login("nobody@framecraft.shop", STRONG_PASSWORD).await;
    assert!(c.snapshot().error.is_some());

    c.clear_error();
    assert!(c.snapshot().error.is_none());
}

#[tokio::test]
async fn test_logout_always_ends_unauthenticated() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();
    h.provider.fail_sign_out();

    c.logout().await;

    let snapshot = c.snapshot();
    assert!(snapshot.identity.is_none());
    assert!(snapshot.business_profile.is_none());
    assert!(snapshot.error.is_none());
    assert_eq!(h.provider.sign_out_calls(), 1);
}

#[tokio::test]
async fn test_external_sign_in_round_trip() {
    let h = Harness::new();
    let id = h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.provider.add_oauth_code(
        "code-1",
        framecraft_integration_tests::provider_user(id, "ada@framecraft.shop", true),
    );
    let c = h.coordinator();

    let url = c.start_external_sign_in(OAuthProvider::Apple).await.unwrap();
    assert!(url.as_str().contains("provider=apple"));

    let outcome = c.complete_external_sign_in("code-1").await.unwrap();
    assert_eq!(c.snapshot().identity.map(|i| i.id), Some(outcome.identity.id));
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_stale_login_result_is_discarded() {
    let h = Harness::new();
    h.seed_user("slow@framecraft.shop", UserRole::IndividualCustomer);
    let fast = h.seed_user("fast@framecraft.shop", UserRole::IndividualCustomer);
    h.provider
        .delay_sign_in("slow@framecraft.shop", Duration::from_millis(200));
    let c = h.coordinator();

    // The slow login starts first; the fast one starts later and finishes first.
    let (slow_result, fast_result) = tokio::join!(
        c.login("slow@framecraft.shop", STRONG_PASSWORD),
        c.login("fast@framecraft.shop", STRONG_PASSWORD),
    );

    // Both callers get their own result...
    assert!(slow_result.is_ok());
    assert!(fast_result.is_ok());
    // ...but the later-started transition owns the snapshot.
    let snapshot = c.snapshot();
    assert_eq!(snapshot.identity.map(|i| i.id), Some(fast));
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn test_loading_holds_while_any_transition_runs() {
    let h = Harness::new();
    h.seed_user("slow@framecraft.shop", UserRole::IndividualCustomer);
    h.provider
        .delay_sign_in("slow@framecraft.shop", Duration::from_millis(150));
    let c = h.coordinator();
    c.initialize().await.unwrap();

    let (_, observed) = tokio::join!(c.login("slow@framecraft.shop", STRONG_PASSWORD), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let during = c.snapshot().loading;
        // A second transition that finishes while the login is still out.
        let _ = c.request_password_reset("not-an-email").await;
        (during, c.snapshot().loading)
    });

    assert_eq!(observed, (true, true));
    assert!(!c.snapshot().loading);
}

// =============================================================================
// Provider events
// =============================================================================

#[tokio::test]
async fn test_own_sign_in_echo_is_ignored() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.initialize().await.unwrap();
    let lookups = h.provider.current_user_calls();

    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();
    let revision = c.snapshot().revision;
    drain_events().await;

    assert_eq!(h.provider.current_user_calls(), lookups);
    assert_eq!(c.snapshot().revision, revision);
}

#[tokio::test]
async fn test_sign_in_elsewhere_updates_snapshot() {
    let h = Harness::new();
    let id = h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.initialize().await.unwrap();

    h.provider.sign_in_elsewhere("ada@framecraft.shop");

    let snapshot = wait_for(&c, |s| s.identity.is_some() && !s.loading).await;
    assert_eq!(snapshot.identity.map(|i| i.id), Some(id));
}

#[tokio::test]
async fn test_expired_session_signs_out() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();

    h.provider.expire_session();

    let snapshot = wait_for(&c, |s| s.identity.is_none()).await;
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_sign_out_during_unrelated_login_is_applied() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.seed_user("slow@framecraft.shop", UserRole::IndividualCustomer);
    h.provider
        .delay_sign_in("slow@framecraft.shop", Duration::from_millis(200));
    let c = h.coordinator();
    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();
    drain_events().await;

    let (login, ()) = tokio::join!(c.login("slow@framecraft.shop", "Wrong1password"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.provider.expire_session();
    });
    drain_events().await;

    assert!(login.is_err());
    assert!(h.provider.session().is_none());
    let snapshot = c.snapshot();
    assert!(!snapshot.is_authenticated());
    assert!(snapshot.identity.is_none());
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn test_sign_out_during_password_reset_is_applied() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.seed_user("slow@framecraft.shop", UserRole::IndividualCustomer);
    h.provider
        .delay_sign_in("slow@framecraft.shop", Duration::from_millis(200));
    let c = h.coordinator();
    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();
    drain_events().await;

    // The slow login keeps a caller transition open while the event lands.
    let pending = c.login("slow@framecraft.shop", "Wrong1password");
    let (_, ()) = tokio::join!(pending, async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        c.request_password_reset("ada@framecraft.shop").await.unwrap();
        h.provider.expire_session();
        let snapshot = wait_for(&c, |s| s.identity.is_none()).await;
        assert!(snapshot.loading, "the slow login is still running");
    });

    assert!(!c.snapshot().is_authenticated());
}

#[tokio::test]
async fn test_token_refresh_keeps_principal() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();
    drain_events().await;
    let before = c.snapshot();
    let lookups = h.provider.current_user_calls();
    let logins = h.store.record_login_calls();

    h.provider
        .emit(AuthChangeEvent::TokenRefreshed, h.provider.session());
    drain_events().await;

    assert_eq!(c.snapshot(), before);
    assert_eq!(h.provider.current_user_calls(), lookups);
    assert_eq!(h.store.record_login_calls(), logins);
}

#[tokio::test]
async fn test_token_refresh_clears_loading_without_refetch() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    h.provider.sign_in_elsewhere("ada@framecraft.shop");
    let c = h.coordinator();
    let before = c.snapshot();
    assert!(before.loading);

    h.provider
        .emit(AuthChangeEvent::TokenRefreshed, h.provider.session());
    let after = wait_for(&c, |s| !s.loading).await;

    assert_eq!(after.identity, before.identity);
    assert_eq!(after.business_profile, before.business_profile);
    assert_eq!(after.revision, before.revision);
    assert_eq!(h.provider.current_user_calls(), 0);
    assert_eq!(h.store.record_login_calls(), 0);
}

#[tokio::test]
async fn test_subscribers_see_changes() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.initialize().await.unwrap();
    let mut rx = c.subscribe();
    rx.mark_unchanged();

    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();

    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_authenticated());
}

// =============================================================================
// Registration, profile and verification
// =============================================================================

#[tokio::test]
async fn test_register_partner_is_pending() {
    let h = Harness::new();
    let c = h.coordinator();
    let form = framecraft_storefront::services::auth::BusinessRegistration {
        account: IndividualRegistration {
            email: "buyer@frameandco.com".to_owned(),
            password: STRONG_PASSWORD.to_owned(),
            confirm_password: STRONG_PASSWORD.to_owned(),
            full_name: "Grace Gallery".to_owned(),
            phone: None,
        },
        company_name: "Frame & Co".to_owned(),
        address: framecraft_storefront::models::BusinessAddress {
            street: "1 Gallery Row".to_owned(),
            city: "Portland".to_owned(),
            state: None,
            zip: "97201".to_owned(),
            country: "US".to_owned(),
        },
        ..Default::default()
    };

    c.register_business_partner(&form).await.unwrap();

    let snapshot = c.snapshot();
    assert!(snapshot.is_business_partner());
    assert_eq!(
        snapshot.business_profile.as_ref().map(|b| b.approval_status),
        Some(ApprovalStatus::Pending)
    );
    assert!(!snapshot.can_view_partner_pricing());
}

#[tokio::test]
async fn test_register_validation_failure_sets_error() {
    let h = Harness::new();
    let c = h.coordinator();
    c.initialize().await.unwrap();

    let form = IndividualRegistration {
        email: "ada@framecraft.shop".to_owned(),
        password: "short".to_owned(),
        confirm_password: "short".to_owned(),
        full_name: "Ada".to_owned(),
        phone: None,
    };
    let err = c.register_individual(&form).await.unwrap_err();

    assert!(matches!(err, AuthError::Validation(_)));
    let snapshot = c.snapshot();
    assert!(snapshot.identity.is_none());
    assert!(snapshot.error.unwrap().contains("password"));
}

#[tokio::test]
async fn test_update_profile_keeps_business_account() {
    let h = Harness::new();
    h.seed_partner("buyer@frameandco.com", ApprovalStatus::Approved);
    let c = h.coordinator();
    c.login("buyer@frameandco.com", STRONG_PASSWORD).await.unwrap();

    let update = ProfileUpdate {
        full_name: Some("Grace Gallery".to_owned()),
        ..ProfileUpdate::default()
    };
    c.update_profile(&update).await.unwrap();

    let snapshot = c.snapshot();
    assert_eq!(
        snapshot.identity.as_ref().and_then(|i| i.full_name.as_deref()),
        Some("Grace Gallery")
    );
    assert!(snapshot.business_profile.is_some());
}

#[tokio::test]
async fn test_verify_email_refreshes_snapshot() {
    let h = Harness::new();
    let id = h
        .provider
        .add_account("new@framecraft.shop", STRONG_PASSWORD, false);
    h.store
        .insert_profile(profile(id, "new@framecraft.shop", UserRole::IndividualCustomer));
    h.provider
        .add_verification_token("token-hash", "new@framecraft.shop");
    let c = h.coordinator();
    c.initialize().await.unwrap();

    c.verify_email("token-hash").await.unwrap();

    let identity = c.snapshot().identity.unwrap();
    assert_eq!(identity.id, id);
    assert!(identity.email_verified);
}

#[tokio::test]
async fn test_password_update_mismatch_sets_error() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let c = h.coordinator();
    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();

    let err = c.update_password("Abcd1234", "Abcd9999").await.unwrap_err();

    assert!(matches!(err, AuthError::PasswordMismatch));
    assert_eq!(h.provider.update_password_calls(), 0);
    let snapshot = c.snapshot();
    assert_eq!(snapshot.error.as_deref(), Some("Passwords do not match"));
    assert!(snapshot.is_authenticated());
}

// =============================================================================
// Partner administration
// =============================================================================

#[tokio::test]
async fn test_partner_admin_requires_sign_in() {
    let h = Harness::new();
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);
    let c = h.coordinator();
    c.initialize().await.unwrap();

    let err = c.approve_partner(partner).await.unwrap_err();

    assert!(matches!(err, AuthError::NotAuthenticated));
    assert!(c.snapshot().error.is_some());
}

#[tokio::test]
async fn test_partner_admin_requires_staff_role() {
    let h = Harness::new();
    h.seed_user("ada@framecraft.shop", UserRole::IndividualCustomer);
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);
    let c = h.coordinator();
    c.login("ada@framecraft.shop", STRONG_PASSWORD).await.unwrap();

    let err = c.approve_partner(partner).await.unwrap_err();

    assert!(matches!(err, AuthError::Forbidden));
    assert_eq!(
        h.store.business(partner).unwrap().approval_status,
        ApprovalStatus::Pending
    );
}

#[tokio::test]
async fn test_admin_approves_and_suspends_partner() {
    let h = Harness::new();
    let admin = h.seed_user("owner@framecraft.shop", UserRole::SuperAdmin);
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Pending);
    let c = h.coordinator();
    c.login("owner@framecraft.shop", STRONG_PASSWORD).await.unwrap();

    let approved = c.approve_partner(partner).await.unwrap();
    assert_eq!(approved.approved_by, Some(admin));

    let suspended = c.suspend_partner(partner).await.unwrap();
    assert_eq!(suspended.approval_status, ApprovalStatus::Suspended);

    // The admin's own principal is untouched.
    assert_eq!(c.snapshot().identity.map(|i| i.id), Some(admin));
}

#[tokio::test]
async fn test_invalid_suspension_sets_error_only() {
    let h = Harness::new();
    let admin = h.seed_user("owner@framecraft.shop", UserRole::Admin);
    let partner = h.seed_partner("buyer@frameandco.com", ApprovalStatus::Rejected);
    let c = h.coordinator();
    c.login("owner@framecraft.shop", STRONG_PASSWORD).await.unwrap();
    let revision = c.snapshot().revision;

    let err = c.suspend_partner(partner).await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidTransition { .. }));
    let snapshot = c.snapshot();
    assert_eq!(snapshot.identity.map(|i| i.id), Some(admin));
    assert_eq!(snapshot.revision, revision);
    assert!(snapshot.error.is_some());
}
