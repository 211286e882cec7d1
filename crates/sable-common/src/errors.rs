//! Error types for Sable services.
//!
//! # Rust Learning Note
//!
//! Rust doesn't have exceptions - it uses `Result<T, E>` for error handling.
//! Every fallible registry call in this workspace returns [`Result<T>`], and
//! callers decide with `?` (propagate) or `match` (recover) what happens next.
//!
//! ## Error taxonomy
//!
//! The registry is an eventually-consistent remote service, so most failures
//! are expected to heal on their own. The variants encode who is allowed to
//! give up:
//!
//! - [`Error::TransientRegistry`]: network, timeout or 5xx. Watch loops retry,
//!   reconciliation logs and keeps going.
//! - [`Error::FatalRegistration`]: the very first registration failed. The
//!   host aborts startup.
//! - [`Error::ConfigurationBinding`]: a configuration section could not be
//!   projected into typed options. Returned to whoever asked for the bind.
//!
//! ```rust
//! use sable_common::{Error, Result};
//!
//! fn connect() -> Result<()> {
//!     Err(Error::transient("list", "connection refused"))
//! }
//!
//! fn caller() -> Result<()> {
//!     match connect() {
//!         Err(e) if e.is_transient() => Ok(()), // try again later
//!         other => other,
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for Sable operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Sable operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The registry could not be reached or answered with a server error.
    #[error("Registry unavailable during {operation}: {reason}")]
    TransientRegistry {
        operation: String,
        reason: String,
    },

    /// Initial registration failed; the process cannot be discovered.
    #[error("Service registration failed for {instance_id}: {reason}")]
    FatalRegistration {
        instance_id: String,
        reason: String,
    },

    /// A configuration section could not be bound to typed options.
    #[error("Configuration binding error in section '{section}': {message}")]
    ConfigurationBinding {
        section: String,
        message: String,
    },

    /// The registry rejected the request (non-success, non-server status).
    #[error("Registry error: {0}")]
    Registry(String),

    /// Protocol error (malformed request or response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid input.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
    },

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled: {operation}")]
    Cancelled {
        operation: String,
    },

    /// Internal error (shouldn't happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a TransientRegistry error.
    pub fn transient(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::TransientRegistry {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a FatalRegistration error.
    pub fn fatal_registration(instance_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FatalRegistration {
            instance_id: instance_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a ConfigurationBinding error.
    pub fn binding(section: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ConfigurationBinding {
            section: section.into(),
            message: message.to_string(),
        }
    }

    /// Creates a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a Cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Returns true when retrying the same call later may succeed.
    ///
    /// Context wrappers are looked through.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientRegistry { .. } | Self::Io(_) => true,
            Self::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Adds context to an error.
    ///
    /// # Example
    /// ```
    /// use sable_common::{Error, Result};
    ///
    /// fn inner() -> Result<()> {
    ///     Err(Error::Registry("403 Forbidden".into()))
    /// }
    ///
    /// fn outer() -> Result<()> {
    ///     inner().map_err(|e| e.context("Failed to deregister"))
    /// }
    /// ```
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}
