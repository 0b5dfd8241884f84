//! Shared set-up for commands that talk to the identity provider.
//!
//! A CLI process lives for one command, so the provider session is persisted
//! to a JSON file between runs (`FC_SESSION_FILE`, default `.fc-session.json`)
//! and restored before the coordinator initializes.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use framecraft_storefront::config::{ConfigError, StorefrontConfig};
use framecraft_storefront::db::{self, ProfileRepository, RepositoryError};
use framecraft_storefront::identity::{IdentityClient, IdentityError, ProviderSession};
use framecraft_storefront::models::SessionSnapshot;
use framecraft_storefront::{AuthError, AuthService, SessionCoordinator};

const DEFAULT_SESSION_FILE: &str = ".fc-session.json";

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("{}", .0.user_message())]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Session file error: {0}")]
    SessionFile(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// The coordinator wired to the live identity provider and database.
pub type Coordinator = SessionCoordinator<IdentityClient, ProfileRepository>;

/// Everything a command needs.
pub struct Context {
    pub config: StorefrontConfig,
    pub client: IdentityClient,
    pub profiles: ProfileRepository,
    pub coordinator: Coordinator,
    session_file: PathBuf,
}

impl Context {
    /// Load configuration, connect, restore the saved session and initialize.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if configuration or connections fail. A failed
    /// initialization is not an error; it shows up in the snapshot.
    pub async fn connect(config: StorefrontConfig) -> Result<Self, CommandError> {
        let pool = db::create_pool(&config.database_url).await?;
        let profiles = ProfileRepository::new(pool);
        let client = IdentityClient::new(&config.identity)?;

        let session_file = std::env::var("FC_SESSION_FILE")
            .map_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE), PathBuf::from);
        if let Some(session) = load_session(&session_file)? {
            client.restore_session(session).await;
        }

        let auth = AuthService::new(Arc::new(client.clone()), Arc::new(profiles.clone()));
        let coordinator = SessionCoordinator::new(auth);

        if let Err(e) = coordinator.initialize().await {
            tracing::debug!(error = %e, "Saved session could not be restored");
        }

        Ok(Self {
            config,
            client,
            profiles,
            coordinator,
            session_file,
        })
    }

    /// Write the provider session back to disk, or remove the file when
    /// signed out.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::SessionFile` if the file cannot be written.
    pub async fn persist_session(&self) -> Result<(), CommandError> {
        match self.client.current_session().await {
            Some(session) => {
                let json = serde_json::to_vec_pretty(&session)?;
                write_private(&self.session_file, &json)?;
            }
            None => {
                if self.session_file.exists() {
                    std::fs::remove_file(&self.session_file)?;
                }
            }
        }
        Ok(())
    }

    /// Settle, persist and return the snapshot.
    ///
    /// # Errors
    ///
    /// As [`Self::persist_session`].
    pub async fn finish(&self) -> Result<SessionSnapshot, CommandError> {
        let snapshot = self.coordinator.wait_until_settled().await;
        self.persist_session().await?;
        Ok(snapshot)
    }
}

fn load_session(path: &Path) -> Result<Option<ProviderSession>, CommandError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    match serde_json::from_slice(&bytes) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
            Ok(None)
        }
    }
}

/// Write a file readable only by the current user (tokens inside).
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)
}

/// Print a value as pretty JSON on stdout.
///
/// # Errors
///
/// Returns `CommandError::Json` if serialization fails.
pub fn print_json(value: &impl serde::Serialize) -> Result<(), CommandError> {
    let json = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}
