//! Error types for papervault.
//!
//! Every variant is a distinct failure mode of the distribution pipeline.
//! `Display` output is intentionally minimal: it signals *what* failed
//! without revealing *why* in ways that could leak cryptographic state.
//! For text shown to end users, prefer [`VaultError::public_message`],
//! which collapses the security-sensitive variants into one generic message.

use thiserror::Error;

use crate::access::{Action, ResourceType, Role};

/// The single error type for all papervault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed input to the pipeline (empty title, empty plaintext, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A required collaborator state is missing, e.g. no custodian provisioned.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The capability matrix does not allow `action` on `resource_type`
    /// for `role`.
    #[error("access denied: {role} role cannot {action} {resource_type}")]
    AccessDenied {
        role: Role,
        resource_type: ResourceType,
        action: Action,
    },

    /// Cipher, key wrap/unwrap, padding or randomness failure. Includes
    /// tampered ciphertext and wrong keys.
    #[error("cryptographic operation failed")]
    CryptoFailure,

    /// Signature verification failed.
    #[error("integrity check failed")]
    IntegrityError,

    /// A document or identity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A transport-encoded key or stored text field could not be decoded.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The storage collaborator failed.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl VaultError {
    /// A message safe to show outside the process.
    ///
    /// Denials, crypto failures and integrity failures all read the same, so
    /// a caller cannot learn which step of retrieval rejected the request.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "the request was invalid",
            Self::Precondition(_) => "the service is not ready to accept this request",
            Self::AccessDenied { .. } | Self::CryptoFailure | Self::IntegrityError => {
                "the request could not be completed"
            }
            Self::NotFound(_) => "the requested item was not found",
            Self::MalformedInput(_) | Self::Persistence(_) => "an internal error occurred",
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;
