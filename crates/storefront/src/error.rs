//! Error reporting and Sentry scope helpers.
//!
//! Typed errors live with their layer (`identity`, `db`, `services::auth`);
//! this module decides what reaches Sentry.

use crate::services::auth::AuthError;

/// Log a failed session transition and capture infrastructure failures.
///
/// Input and credential problems are the user's to fix and are logged at
/// debug only. Infrastructure failures (database, provider transport,
/// incomplete registrations) go to Sentry.
pub fn report(operation: &str, err: &AuthError) {
    if err.is_infrastructure() {
        let event_id = sentry::capture_error(err);
        if let AuthError::IncompleteRegistration {
            identity_id, stage, ..
        } = err
        {
            tracing::error!(
                operation,
                %identity_id,
                %stage,
                error = %err,
                sentry_event_id = %event_id,
                "Orphaned identity needs reconciliation"
            );
        } else {
            tracing::error!(
                operation,
                error = %err,
                sentry_event_id = %event_id,
                "Session transition failed"
            );
        }
    } else {
        tracing::debug!(operation, error = %err, "Session transition rejected");
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a session transition.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("auth", "Signed in", Some(&[("role", "business_partner")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
