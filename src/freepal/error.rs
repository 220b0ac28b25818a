use thiserror::Error;

use crate::freepal::notices::{Notice, NoticeSeverity};
use crate::freepal::remote::RemoteError;

pub type Result<T> = core::result::Result<T, FreePalError>;

#[derive(Error, Debug)]
pub enum FreePalError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FreePalError {
    /// Maps a lookup failure onto `NotFound(what)`, keeping other remote errors as they are.
    pub(crate) fn from_lookup(err: RemoteError, what: impl Into<String>) -> Self {
        if err.is_not_found() {
            FreePalError::NotFound(what.into())
        } else {
            FreePalError::Remote(err)
        }
    }

    /// Whether the user can keep working after seeing this error.
    ///
    /// Only a missing identity blocks the UI; everything else is shown as a
    /// transient notice and the local state has already been restored.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FreePalError::NotAuthenticated)
    }

    /// Builds the user-facing notice for this error.
    pub fn notice(&self) -> Notice {
        let severity = if self.is_recoverable() {
            NoticeSeverity::Recoverable
        } else {
            NoticeSeverity::Blocking
        };

        let title = match self {
            FreePalError::NotAuthenticated => "Please sign in",
            FreePalError::NotFound(_) | FreePalError::Remote(RemoteError::NotFound) => {
                "No longer available"
            }
            FreePalError::NotAuthorized(_) => "Not allowed",
            FreePalError::Validation(_) => "Check your input",
            FreePalError::Remote(_) => "Something went wrong",
            _ => "Unexpected error",
        };

        Notice::error(severity, title, self.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for FreePalError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        FreePalError::Other(anyhow::anyhow!(err.to_string()))
    }
}
