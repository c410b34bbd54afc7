use std::io;
use std::time::Duration;

use thiserror::Error;

/// The error type for resolver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading system resolver configuration
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The domain name cannot be normalized into a resolvable form
    #[error("Invalid domain name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Every permitted attempt failed to produce an address
    #[error("Unable to resolve '{name}' after {attempts} attempt(s)")]
    NotResolved { name: String, attempts: u32 },

    /// Resolver or system configuration is invalid
    #[error("Configuration error: {details}")]
    Config { details: String },

    /// A lookup backend could not be set up
    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),
}

impl Error {
    /// Create a new invalid name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new not resolved error
    pub fn not_resolved(name: impl Into<String>, attempts: u32) -> Self {
        Self::NotResolved {
            name: name.into(),
            attempts,
        }
    }

    /// Create a new configuration error
    pub fn config_error(details: impl Into<String>) -> Self {
        Self::Config {
            details: details.into(),
        }
    }
}

/// A specialized `Result` type for resolver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by a [`Lookup`](crate::dns::Lookup) implementation.
///
/// The resolver treats every variant the same way: the attempt produced no
/// addresses. The distinction only matters for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No answer arrived within the attempt timeout
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
    /// The name exists nowhere or has no address records
    #[error("no addresses found for {0}")]
    NotFound(String),
    /// Temporary failure worth retrying, such as `EAI_AGAIN`
    #[error("transient failure: {0}")]
    Transient(String),
    /// This lookup cannot query the requested upstream
    #[error("upstream {0} is not supported by this lookup")]
    UnsupportedUpstream(String),
    /// Any other failure reported by the underlying resolver
    #[error("resolver error: {0}")]
    Resolver(String),
}
