//! Crate-wide error taxonomy.
//!
//! Every failure that crosses a module boundary is one of the closed set of
//! kinds below. Adapters translate transport-level failures into this taxonomy
//! before returning; the reconciler and dispatcher record outcomes on events
//! instead of propagating, and only [`Error::Fatal`] aborts a sync run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Network blip, rate limit, 5xx, timeout. The affected event goes
    /// PARTIAL and is retried on the next run.
    #[error("transient: {0}")]
    Transient(String),

    /// Validation rejection, bad credentials, unmappable category. The
    /// affected event goes ERROR with the reason.
    #[error("permanent: {reason}")]
    Permanent { reason: String },

    /// The remote says the listing no longer exists. Success for close
    /// intents, consistency drift for price/quantity intents.
    #[error("not found: {0}")]
    NotFound(String),

    /// Pending-event unique-index collision. Dedup worked; ignored.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database unreachable or an invariant violated. Aborts the run.
    #[error("fatal: {0}")]
    Fatal(String),

    /// A rogue listing could not be linked to a local product.
    #[error("unmatched listing: {0}")]
    Match(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Store-boundary failure that is worth retrying on the next run.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::Transient(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_server_error() || status.as_u16() == 429 => {
                Self::Transient(err.to_string())
            }
            Some(status) if status.as_u16() == 404 => Self::NotFound(err.to_string()),
            Some(status) if status.is_client_error() => Self::Permanent {
                reason: err.to_string(),
            },
            _ => Self::Transient(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Permanent {
            reason: format!("malformed payload: {err}"),
        }
    }
}

/// Configuration loading failures, reported before a run starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
