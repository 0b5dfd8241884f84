//! Business partner administration.
//!
//! # Usage
//!
//! ```bash
//! # Sign in as an admin first
//! fc-cli auth login -e owner@framecraft.shop --password '...'
//!
//! fc-cli partner pending
//! fc-cli partner show 6f1c1d8e-3a4b-4c5d-9e6f-7a8b9c0d1e2f
//! fc-cli partner approve 6f1c1d8e-3a4b-4c5d-9e6f-7a8b9c0d1e2f
//! fc-cli partner reject 6f1c1d8e-3a4b-4c5d-9e6f-7a8b9c0d1e2f
//! fc-cli partner suspend 6f1c1d8e-3a4b-4c5d-9e6f-7a8b9c0d1e2f
//! ```
//!
//! Approve, reject and suspend run as the signed-in identity, which must be
//! an admin or super admin.

use framecraft_core::IdentityId;

use super::context::{CommandError, Context, print_json};

/// Partner administration action.
#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Approve,
    Reject,
    Suspend,
}

/// Apply an approval decision to a business account.
///
/// # Errors
///
/// Returns `CommandError::InvalidArgument` for a malformed ID, or
/// `CommandError::Auth` if the caller is not an admin or the change is refused.
pub async fn decide(ctx: &Context, decision: Decision, partner_id: &str) -> Result<(), CommandError> {
    let partner_id = parse_id(partner_id)?;

    let result = match decision {
        Decision::Approve => ctx.coordinator.approve_partner(partner_id).await,
        Decision::Reject => ctx.coordinator.reject_partner(partner_id).await,
        Decision::Suspend => ctx.coordinator.suspend_partner(partner_id).await,
    };
    ctx.persist_session().await?;

    let profile = result?;
    tracing::info!(
        %partner_id,
        status = %profile.approval_status,
        "Business account updated"
    );
    print_json(&profile)
}

/// Show a business account.
///
/// # Errors
///
/// Returns `CommandError::Auth` if no business account exists for the ID.
pub async fn show(ctx: &Context, partner_id: &str) -> Result<(), CommandError> {
    let partner_id = parse_id(partner_id)?;
    let profile = ctx
        .coordinator
        .auth()
        .fetch_business_profile(partner_id)
        .await?
        .ok_or(framecraft_storefront::AuthError::PartnerNotFound(partner_id))?;
    print_json(&profile)
}

/// List business accounts awaiting review.
///
/// # Errors
///
/// Returns `CommandError::Repository` if the query fails.
pub async fn pending(ctx: &Context) -> Result<(), CommandError> {
    let partners = ctx.profiles.list_pending_partners().await?;
    tracing::info!(count = partners.len(), "Pending business accounts");
    print_json(&partners)
}

fn parse_id(input: &str) -> Result<IdentityId, CommandError> {
    input
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("not an identity ID: {input}")))
}
