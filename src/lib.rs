//! # papervault
//!
//! Hybrid-encrypted, signed and access-gated distribution of exam papers.
//!
//! An Author uploads a paper; it is sealed under a one-time AES-256-GCM
//! content key, the content key is wrapped for the single Custodian's RSA
//! key, and the plaintext is signed with the Author's RSA key. Only the
//! Custodian can retrieve it, and retrieval fails closed on any tampering.
//! Every access decision is checked against a static role capability matrix
//! and written to an append-only audit trail.
//!
//! ## Public API
//!
//! [`DistributionPipeline`] is the entry point. The collaborator traits
//! ([`IdentityDirectory`], [`DocumentRepository`], [`AuditSink`]) are the
//! seams where callers plug in their own storage; in-memory implementations
//! are provided.

pub mod access;
pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod keys;
pub mod pipeline;
pub mod repository;
pub mod signature;
pub mod wrap;

pub use access::{AccessController, Action, CapabilityMatrix, ResourceType, Role};
pub use audit::{AuditLog, AuditRecord, AuditSink, FileAuditSink};
pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use identity::{Identity, IdentityDirectory, MemoryDirectory};
pub use pipeline::DistributionPipeline;
pub use repository::{
    DocumentId, DocumentRepository, DocumentStatus, EncryptedDocument, MemoryRepository,
};
