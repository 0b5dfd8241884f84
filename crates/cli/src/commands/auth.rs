//! Sign-in, registration and account commands.
//!
//! # Usage
//!
//! ```bash
//! fc-cli auth login -e ada@framecraft.shop --password 'Gilded1frame'
//! fc-cli auth register -e ada@framecraft.shop -n "Ada Frame" --password 'Gilded1frame'
//! fc-cli auth register-partner -e buyer@frameandco.com -n "Grace Gallery" \
//!     --company "Frame & Co" --street "1 Gallery Row" --city Portland --zip 97201 --country US \
//!     --password 'Gilded1frame'
//! fc-cli auth whoami
//! fc-cli auth oauth-url --provider google
//! fc-cli auth logout
//! ```
//!
//! Every command prints the resulting session snapshot as JSON.

use std::io::BufRead as _;

use framecraft_storefront::identity::OAuthProvider;
use framecraft_storefront::models::ProfileUpdate;
use framecraft_storefront::services::auth::{BusinessRegistration, IndividualRegistration};

use super::context::{CommandError, Context, print_json};

/// Sign in with email and password.
///
/// # Errors
///
/// Returns `CommandError::Auth` if the sign-in is refused.
pub async fn login(ctx: &Context, email: &str, password: &str) -> Result<(), CommandError> {
    let result = ctx.coordinator.login(email, password).await;
    finish(ctx, result).await
}

/// Register an individual customer.
///
/// # Errors
///
/// Returns `CommandError::Auth` with every validation failure, or the
/// provider's refusal.
pub async fn register(ctx: &Context, form: &IndividualRegistration) -> Result<(), CommandError> {
    let result = ctx.coordinator.register_individual(form).await;
    finish(ctx, result).await
}

/// Register a business partner; the account starts pending approval.
///
/// # Errors
///
/// As [`register`].
pub async fn register_partner(
    ctx: &Context,
    form: &BusinessRegistration,
) -> Result<(), CommandError> {
    let result = ctx.coordinator.register_business_partner(form).await;
    finish(ctx, result).await
}

/// Print the current session snapshot.
///
/// # Errors
///
/// Returns `CommandError` if the snapshot cannot be printed.
pub async fn whoami(ctx: &Context) -> Result<(), CommandError> {
    finish(ctx, Ok(())).await
}

/// Sign out and forget the saved session.
///
/// # Errors
///
/// Returns `CommandError::SessionFile` if the session file cannot be removed.
pub async fn logout(ctx: &Context) -> Result<(), CommandError> {
    ctx.coordinator.logout().await;
    finish(ctx, Ok(())).await
}

/// Print the OAuth URL, wait for the callback code on stdin and finish the
/// sign-in in the same process (the PKCE verifier lives in memory).
///
/// # Errors
///
/// Returns `CommandError::Auth` if the provider refuses the code.
pub async fn oauth(ctx: &Context, provider: Option<OAuthProvider>) -> Result<(), CommandError> {
    let provider = provider.unwrap_or(ctx.config.identity.default_oauth_provider);
    let url = ctx.coordinator.start_external_sign_in(provider).await?;

    #[allow(clippy::print_stderr)]
    {
        eprintln!("Open this URL to sign in with {provider}:\n\n  {url}\n");
        eprintln!("Then paste the `code` parameter from the callback URL:");
    }

    let code = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await
    .map_err(|e| e.to_string())
    .and_then(|read| read.map_err(|e| e.to_string()))
    .map_err(|e| CommandError::InvalidArgument(format!("reading code: {e}")))?;

    let code = code.trim();
    if code.is_empty() {
        return Err(CommandError::InvalidArgument("no code entered".to_owned()));
    }

    let result = ctx.coordinator.complete_external_sign_in(code).await;
    finish(ctx, result).await
}

/// Email a password-reset link.
///
/// # Errors
///
/// Returns `CommandError::Auth` if the request is refused.
pub async fn reset_password(ctx: &Context, email: &str) -> Result<(), CommandError> {
    let result = ctx.coordinator.request_password_reset(email).await;
    finish(ctx, result).await
}

/// Change the signed-in user's password.
///
/// # Errors
///
/// Returns `CommandError::Auth` on mismatch, weak password or refusal.
pub async fn change_password(
    ctx: &Context,
    password: &str,
    confirm: &str,
) -> Result<(), CommandError> {
    let result = ctx.coordinator.update_password(password, confirm).await;
    finish(ctx, result).await
}

/// Confirm an email address with the token from the verification mail.
///
/// # Errors
///
/// Returns `CommandError::Auth` if the token is invalid or expired.
pub async fn verify_email(ctx: &Context, token: &str) -> Result<(), CommandError> {
    let result = ctx.coordinator.verify_email(token).await;
    finish(ctx, result).await
}

/// Send the verification email again.
///
/// # Errors
///
/// Returns `CommandError::Auth` if the request is refused.
pub async fn resend_verification(ctx: &Context, email: &str) -> Result<(), CommandError> {
    let result = ctx.coordinator.resend_verification(email).await;
    finish(ctx, result).await
}

/// Update the signed-in user's name, phone or avatar.
///
/// # Errors
///
/// Returns `CommandError::InvalidArgument` if nothing would change, or
/// `CommandError::Auth` if the update fails.
pub async fn update_profile(ctx: &Context, update: &ProfileUpdate) -> Result<(), CommandError> {
    if update.is_empty() {
        return Err(CommandError::InvalidArgument(
            "nothing to update; pass --name, --phone or --avatar-url".to_owned(),
        ));
    }
    let result = ctx.coordinator.update_profile(update).await;
    finish(ctx, result).await
}

/// Persist the session, print the snapshot, then surface the command's error.
async fn finish<T>(
    ctx: &Context,
    result: Result<T, framecraft_storefront::AuthError>,
) -> Result<(), CommandError> {
    let snapshot = ctx.finish().await?;
    print_json(&snapshot)?;
    result.map(|_| ()).map_err(CommandError::from)
}
