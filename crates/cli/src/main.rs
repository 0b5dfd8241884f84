//! Framecraft CLI - Migrations, sign-in flows and partner approval.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! fc-cli migrate
//!
//! # Sign in and show who is signed in
//! fc-cli auth login -e ada@framecraft.shop --password 'Gilded1frame'
//! fc-cli auth whoami
//!
//! # Approve a business partner (as an admin)
//! fc-cli partner approve 6f1c1d8e-3a4b-4c5d-9e6f-7a8b9c0d1e2f
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `auth` - Sign in, register, recover and manage the current account
//! - `partner` - Review business partner applications

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framecraft_storefront::config::StorefrontConfig;
use framecraft_storefront::identity::OAuthProvider;
use framecraft_storefront::models::{BusinessAddress, ProfileUpdate};
use framecraft_storefront::services::auth::{BusinessRegistration, IndividualRegistration};

mod commands;

use commands::context::Context;
use commands::partner::Decision;

#[derive(Parser)]
#[command(name = "fc-cli")]
#[command(author, version, about = "Framecraft CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Sign in, register and manage the current account
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Review business partner applications (admin only)
    Partner {
        #[command(subcommand)]
        action: PartnerAction,
    },
}

#[derive(clap::Args)]
struct AccountArgs {
    /// Email address
    #[arg(short, long)]
    email: String,

    /// Full name
    #[arg(short, long)]
    name: String,

    /// Phone number
    #[arg(long)]
    phone: Option<String>,

    /// Password
    #[arg(long, env = "FC_PASSWORD", hide_env_values = true)]
    password: String,

    /// Password confirmation (defaults to --password)
    #[arg(long)]
    confirm_password: Option<String>,
}

impl AccountArgs {
    fn into_form(self) -> IndividualRegistration {
        IndividualRegistration {
            confirm_password: self.confirm_password.unwrap_or_else(|| self.password.clone()),
            email: self.email,
            password: self.password,
            full_name: self.name,
            phone: self.phone,
        }
    }
}

#[derive(Subcommand)]
enum AuthAction {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(long, env = "FC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Register an individual customer
    Register {
        #[command(flatten)]
        account: AccountArgs,
    },
    /// Register a business partner (starts pending approval)
    RegisterPartner {
        #[command(flatten)]
        account: AccountArgs,

        /// Company name
        #[arg(long)]
        company: String,

        /// Business type (e.g. gallery, retailer)
        #[arg(long)]
        business_type: Option<String>,

        /// Tax ID
        #[arg(long)]
        tax_id: Option<String>,

        #[arg(long)]
        street: String,

        #[arg(long)]
        city: String,

        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        zip: String,

        #[arg(long)]
        country: String,

        #[arg(long)]
        contact_person: Option<String>,

        #[arg(long)]
        contact_phone: Option<String>,

        #[arg(long)]
        contact_email: Option<String>,
    },
    /// Sign in through an OAuth provider
    OauthUrl {
        /// Provider (`google`, `apple`, `facebook`, `github`)
        #[arg(short, long)]
        provider: Option<OAuthProvider>,
    },
    /// Show the current session
    Whoami,
    /// Sign out
    Logout,
    /// Email a password-reset link
    ResetPassword {
        #[arg(short, long)]
        email: String,
    },
    /// Change the signed-in user's password
    ChangePassword {
        #[arg(long, env = "FC_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        confirm_password: Option<String>,
    },
    /// Confirm an email address
    VerifyEmail {
        /// Token hash from the verification email
        token: String,
    },
    /// Send the verification email again
    ResendVerification {
        #[arg(short, long)]
        email: String,
    },
    /// Update the signed-in user's profile
    UpdateProfile {
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum PartnerAction {
    /// List business accounts awaiting review
    Pending,
    /// Show a business account
    Show { id: String },
    /// Approve a business account
    Approve { id: String },
    /// Reject a business account
    Reject { id: String },
    /// Suspend an approved business account
    Suspend { id: String },
}

/// Initialize Sentry when `SENTRY_DSN` is set; the guard must be kept alive.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|v| !v.is_empty())?;
    let environment = std::env::var("SENTRY_ENVIRONMENT").ok();

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: environment.map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Sentry before the subscriber so the layer has a client
    let _sentry_guard = init_sentry();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "framecraft_storefront=info,fc_cli=info".into());

    // Logs go to stderr; stdout carries JSON output
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Auth { action } => {
            let ctx = Context::connect(StorefrontConfig::from_env()?).await?;
            run_auth(&ctx, action).await?;
        }
        Commands::Partner { action } => {
            let ctx = Context::connect(StorefrontConfig::from_env()?).await?;
            match action {
                PartnerAction::Pending => commands::partner::pending(&ctx).await?,
                PartnerAction::Show { id } => commands::partner::show(&ctx, &id).await?,
                PartnerAction::Approve { id } => {
                    commands::partner::decide(&ctx, Decision::Approve, &id).await?;
                }
                PartnerAction::Reject { id } => {
                    commands::partner::decide(&ctx, Decision::Reject, &id).await?;
                }
                PartnerAction::Suspend { id } => {
                    commands::partner::decide(&ctx, Decision::Suspend, &id).await?;
                }
            }
        }
    }
    Ok(())
}

async fn run_auth(ctx: &Context, action: AuthAction) -> Result<(), commands::context::CommandError> {
    use commands::auth;

    match action {
        AuthAction::Login { email, password } => auth::login(ctx, &email, &password).await,
        AuthAction::Register { account } => auth::register(ctx, &account.into_form()).await,
        AuthAction::RegisterPartner {
            account,
            company,
            business_type,
            tax_id,
            street,
            city,
            state,
            zip,
            country,
            contact_person,
            contact_phone,
            contact_email,
        } => {
            let form = BusinessRegistration {
                account: account.into_form(),
                company_name: company,
                business_type,
                tax_id,
                address: BusinessAddress {
                    street,
                    city,
                    state,
                    zip,
                    country,
                },
                contact_person,
                contact_phone,
                contact_email,
            };
            auth::register_partner(ctx, &form).await
        }
        AuthAction::OauthUrl { provider } => auth::oauth(ctx, provider).await,
        AuthAction::Whoami => auth::whoami(ctx).await,
        AuthAction::Logout => auth::logout(ctx).await,
        AuthAction::ResetPassword { email } => auth::reset_password(ctx, &email).await,
        AuthAction::ChangePassword {
            password,
            confirm_password,
        } => {
            let confirm = confirm_password.unwrap_or_else(|| password.clone());
            auth::change_password(ctx, &password, &confirm).await
        }
        AuthAction::VerifyEmail { token } => auth::verify_email(ctx, &token).await,
        AuthAction::ResendVerification { email } => auth::resend_verification(ctx, &email).await,
        AuthAction::UpdateProfile {
            name,
            phone,
            avatar_url,
        } => {
            let update = ProfileUpdate {
                full_name: name,
                phone,
                avatar_url,
            };
            auth::update_profile(ctx, &update).await
        }
    }
}
