//! Error types for the softphone core
//!
//! Errors fall into the same four buckets the coordinator reasons about:
//!
//! - **Validation** - a malformed URI typed by the user. Reported synchronously,
//!   nothing is mutated.
//! - **Signaling** - a command the signaling stack could not carry out. Reported
//!   back through the serialized callback path, never retried automatically.
//! - **State** - an intent that does not fit the current state (unknown call,
//!   registration already in progress, shutdown already started).
//! - **Persistence** - the credential store could not be read or written.
//!
//! Stale signaling events are not errors at all: they are dropped with a debug log.
//!
//! # Example
//!
//! ```rust
//! use rvoip_softphone_core::SoftphoneError;
//!
//! let err = SoftphoneError::invalid_uri("sip:", "missing host");
//! assert_eq!(err.category(), "validation");
//! assert!(!err.is_recoverable());
//! ```

use thiserror::Error;

use crate::call::CallId;
use crate::registration::RegistrationPhase;

/// Result type alias for softphone-core operations
pub type SoftphoneResult<T> = Result<T, SoftphoneError>;

/// Errors produced by the softphone core and by [`crate::SignalingStack`] implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SoftphoneError {
    /// A SIP URI failed syntax validation
    #[error("Invalid SIP URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// A menu action name the coordinator does not know
    #[error("Unknown menu action '{action}'")]
    UnknownMenuAction { action: String },

    /// Registration related errors
    #[error("Registration already in progress (phase: {phase})")]
    RegistrationInProgress { phase: RegistrationPhase },

    /// Call related errors
    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    #[error("Call {call_id} has no request handle yet")]
    MissingRequestHandle { call_id: CallId },

    /// Signaling stack errors
    #[error("Signaling command '{command}' failed: {reason}")]
    SignalingFailed { command: String, reason: String },

    #[error("Transport failed: {reason}")]
    TransportFailed { reason: String },

    /// Lifecycle errors
    #[error("Softphone is shutting down")]
    ShuttingDown,

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Credential persistence errors
    #[error("Credential store error: {reason}")]
    CredentialStore { reason: String },
}

impl SoftphoneError {
    /// Create an invalid URI error
    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUri { uri: uri.into(), reason: reason.into() }
    }

    /// Create a signaling failure for the named command
    pub fn signaling_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignalingFailed { command: command.into(), reason: reason.into() }
    }

    /// Create a transport error
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        Self::TransportFailed { reason: reason.into() }
    }

    /// Create a credential store error
    pub fn credential_store(reason: impl Into<String>) -> Self {
        Self::CredentialStore { reason: reason.into() }
    }

    /// Check if this error is a synchronous validation failure
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            SoftphoneError::InvalidUri { .. }
                | SoftphoneError::InvalidConfiguration { .. }
                | SoftphoneError::UnknownMenuAction { .. }
        )
    }

    /// Check if retrying the same operation later could succeed
    ///
    /// The core itself never retries; this is a hint for the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SoftphoneError::TransportFailed { .. }
            | SoftphoneError::SignalingFailed { .. }
            | SoftphoneError::RegistrationInProgress { .. }
            | SoftphoneError::CredentialStore { .. } => true,

            SoftphoneError::InvalidUri { .. }
            | SoftphoneError::InvalidConfiguration { .. }
            | SoftphoneError::UnknownMenuAction { .. }
            | SoftphoneError::CallNotFound { .. }
            | SoftphoneError::MissingRequestHandle { .. }
            | SoftphoneError::ShuttingDown => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            SoftphoneError::InvalidUri { .. }
            | SoftphoneError::InvalidConfiguration { .. }
            | SoftphoneError::UnknownMenuAction { .. } => "validation",

            SoftphoneError::RegistrationInProgress { .. } => "registration",

            SoftphoneError::CallNotFound { .. } | SoftphoneError::MissingRequestHandle { .. } => "call",

            SoftphoneError::SignalingFailed { .. } | SoftphoneError::TransportFailed { .. } => "signaling",

            SoftphoneError::ShuttingDown => "lifecycle",

            SoftphoneError::CredentialStore { .. } => "persistence",
        }
    }
}

impl From<serde_json::Error> for SoftphoneError {
    fn from(err: serde_json::Error) -> Self {
        SoftphoneError::credential_store(err.to_string())
    }
}

impl From<std::io::Error> for SoftphoneError {
    fn from(err: std::io::Error) -> Self {
        SoftphoneError::credential_store(err.to_string())
    }
}
