//! Upload and retrieval of exam papers.
//!
//! Upload moves a paper from plaintext to a stored record:
//! 1. Authorize (create + encrypt on Document)
//! 2. Encrypt under a fresh content key
//! 3. Wrap the content key for the active custodian
//! 4. Sign the plaintext with the author's key
//! 5. Persist
//!
//! Retrieve reverses it and fails closed: a paper that decrypts but does
//! not verify is discarded, never returned.
//!
//! The pipeline holds no state between calls. Every collaborator is passed
//! in at construction, and the whole type is `Send + Sync` so independent
//! uploads and retrievals can run in parallel.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::access::{
    AccessController, Action, CapabilityGrant, CapabilityMatrix, ResourceType, Role,
};
use crate::audit::AuditSink;
use crate::config::VaultConfig;
use crate::crypto::{AesGcmCipher, ContentCipher};
use crate::error::{Result, VaultError};
use crate::identity::{Identity, IdentityDirectory};
use crate::keys::{PrivateKey, PublicKey};
use crate::repository::{
    self, DocumentId, DocumentRepository, DocumentStatus, DocumentSummary, NewDocument,
};
use crate::signature::SignatureService;
use crate::wrap::{KeyWrapper, RsaKeyWrapper};

/// Artifacts produced for one upload, all still binary.
struct Sealed {
    ciphertext: Vec<u8>,
    wrapped_key: Vec<u8>,
    signature: Vec<u8>,
}

/// Orchestrates the cipher, key wrapper and signature service behind the
/// access controller.
#[derive(Clone)]
pub struct DistributionPipeline {
    config: VaultConfig,
    access: AccessController,
    cipher: Arc<dyn ContentCipher>,
    wrapper: Arc<dyn KeyWrapper>,
    signatures: SignatureService,
    directory: Arc<dyn IdentityDirectory>,
    repository: Arc<dyn DocumentRepository>,
}

impl std::fmt::Debug for DistributionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionPipeline")
            .field("config", &self.config)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl DistributionPipeline {
    /// Build a pipeline with the seeded capability matrix, AES-256-GCM, and
    /// the RSA paddings named in `config`.
    pub fn new(
        config: VaultConfig,
        directory: Arc<dyn IdentityDirectory>,
        repository: Arc<dyn DocumentRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            access: AccessController::new(CapabilityMatrix::seed(), audit),
            cipher: Arc::new(AesGcmCipher),
            wrapper: Arc::new(RsaKeyWrapper::new(config.wrap_padding)),
            signatures: SignatureService::new(config.signature_padding),
            directory,
            repository,
            config,
        })
    }

    /// Replace the content cipher.
    pub fn with_content_cipher(mut self, cipher: Arc<dyn ContentCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Replace the key wrapper.
    pub fn with_key_wrapper(mut self, wrapper: Arc<dyn KeyWrapper>) -> Self {
        self.wrapper = wrapper;
        self
    }

    /// Check `action` against the role the directory holds for `actor`.
    ///
    /// The caller's `Identity` is only a claim: an unknown user, or a role
    /// that differs from the provisioned one, is denied and audited like
    /// any other denial.
    fn authorize(
        &self,
        actor: &Identity,
        resource_type: ResourceType,
        action: Action,
        resource_id: Option<DocumentId>,
    ) -> Result<()> {
        let reason = match self.directory.role_of(&actor.id) {
            Ok(role) if role == actor.role => {
                return self.access.enforce(actor, resource_type, action, resource_id);
            }
            Ok(role) => format!("claimed role {} but provisioned as {role}", actor.role),
            Err(VaultError::NotFound(_)) => format!("unknown user {}", actor.id),
            Err(e) => return Err(e),
        };
        Err(self.access.deny(actor, resource_type, action, resource_id, &reason))
    }

    /// Encrypt, wrap, sign and store a paper. Returns the new document id.
    ///
    /// Nothing is stored unless every step succeeds.
    pub fn upload(
        &self,
        actor: &Identity,
        title: &str,
        subject: &str,
        exam_date: NaiveDate,
        plaintext: &[u8],
    ) -> Result<DocumentId> {
        self.authorize(actor, ResourceType::Document, Action::Create, None)?;
        self.authorize(actor, ResourceType::Document, Action::Encrypt, None)?;
        self.validate_upload(title, subject, plaintext)?;

        // Resolved before any key material is generated.
        let custodian = self
            .directory
            .current_public_key(Role::Custodian)
            .map_err(|e| precondition(e, "no custodian provisioned"))?;
        let signer = self
            .directory
            .private_key_of(&actor.id)
            .map_err(|e| precondition(e, "author holds no signing key"))?;

        let sealed = self.seal(plaintext, &custodian, &signer).map_err(|e| {
            warn!(actor = %actor.id, error = %e, "upload aborted during sealing");
            VaultError::CryptoFailure
        })?;

        let id = self.repository.insert(NewDocument {
            title: title.trim().to_string(),
            subject: subject.trim().to_string(),
            author_id: actor.id.clone(),
            exam_date,
            ciphertext: repository::encode_field(&sealed.ciphertext),
            wrapped_content_key: repository::encode_field(&sealed.wrapped_key),
            signature: repository::encode_field(&sealed.signature),
            status: DocumentStatus::Pending,
            created_at: Utc::now(),
        })?;

        info!(actor = %actor.id, document = id, bytes = plaintext.len(), "paper uploaded");
        Ok(id)
    }

    fn validate_upload(&self, title: &str, subject: &str, plaintext: &[u8]) -> Result<()> {
        if title.trim().is_empty() {
            return Err(VaultError::Validation("title cannot be empty".into()));
        }
        if subject.trim().is_empty() {
            return Err(VaultError::Validation("subject cannot be empty".into()));
        }
        if plaintext.is_empty() {
            return Err(VaultError::Validation("document is empty".into()));
        }
        if plaintext.len() > self.config.max_document_bytes {
            return Err(VaultError::Validation(format!(
                "document exceeds {} bytes",
                self.config.max_document_bytes
            )));
        }
        Ok(())
    }

    fn seal(&self, plaintext: &[u8], custodian: &PublicKey, signer: &PrivateKey) -> Result<Sealed> {
        let key = self.cipher.generate_key()?;
        let ciphertext = self.cipher.encrypt(plaintext, &key)?;
        let wrapped_key = self.wrapper.wrap(&key, custodian)?;
        let signature = self.signatures.sign(plaintext, signer)?;
        Ok(Sealed {
            ciphertext,
            wrapped_key,
            signature,
        })
    }

    /// Unwrap, decrypt and verify a stored paper.
    ///
    /// Only the custodian that was active at upload time can unwrap. Tampered
    /// ciphertext fails before the signature is looked at; a signature that
    /// does not match the decrypted bytes is audited and reported as an
    /// integrity failure with no plaintext returned.
    pub fn retrieve(&self, actor: &Identity, id: DocumentId) -> Result<Vec<u8>> {
        self.authorize(actor, ResourceType::Document, Action::Read, Some(id))?;
        self.authorize(actor, ResourceType::Document, Action::Decrypt, Some(id))?;

        let record = self
            .repository
            .fetch_by_id(id)?
            .ok_or_else(|| VaultError::NotFound(format!("document {id}")))?;

        let private = self
            .directory
            .private_key_of(&actor.id)
            .map_err(|e| precondition(e, "custodian holds no decryption key"))?;

        let wrapped = repository::decode_field("wrapped_content_key", &record.wrapped_content_key)
            .map_err(|_| VaultError::CryptoFailure)?;
        let ciphertext = repository::decode_field("ciphertext", &record.ciphertext)
            .map_err(|_| VaultError::CryptoFailure)?;

        let key = self.wrapper.unwrap(&wrapped, &private).map_err(|_| {
            warn!(actor = %actor.id, document = id, "content key unwrap failed");
            VaultError::CryptoFailure
        })?;
        let mut plaintext = Zeroizing::new(self.cipher.decrypt(&ciphertext, &key).map_err(|_| {
            warn!(actor = %actor.id, document = id, "content decryption failed");
            VaultError::CryptoFailure
        })?);

        let author = self.directory.public_key_of(&record.author_id)?;
        let verified = repository::decode_field("signature", &record.signature)
            .and_then(|signature| self.signatures.verify(&plaintext, &signature, &author));
        if verified.is_err() {
            // The decrypted buffer is zeroised when `plaintext` drops here.
            self.access.record_outcome(
                actor,
                ResourceType::Document,
                Action::Read,
                Some(id),
                false,
                "signature verification failed",
            );
            warn!(
                actor = %actor.id,
                document = id,
                author = %record.author_id,
                "integrity check failed"
            );
            return Err(VaultError::IntegrityError);
        }

        debug!(actor = %actor.id, document = id, "paper retrieved and verified");
        Ok(std::mem::take(&mut *plaintext))
    }

    /// Metadata for every stored paper, newest first. No content is returned.
    pub fn list_documents(&self, actor: &Identity) -> Result<Vec<DocumentSummary>> {
        self.authorize(actor, ResourceType::Document, Action::Read, None)?;
        self.summaries(|_| true)
    }

    /// Metadata for the papers `actor` uploaded, newest first.
    pub fn list_authored(&self, actor: &Identity) -> Result<Vec<DocumentSummary>> {
        self.authorize(actor, ResourceType::Document, Action::Read, None)?;
        self.summaries(|s| s.author_id == actor.id)
    }

    fn summaries(&self, keep: impl Fn(&DocumentSummary) -> bool) -> Result<Vec<DocumentSummary>> {
        let mut summaries: Vec<DocumentSummary> = self
            .repository
            .list()?
            .iter()
            .map(|doc| doc.summary())
            .filter(|s| keep(s))
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    /// The capability rows for the role `actor` is provisioned with.
    pub fn permissions(&self, actor: &Identity) -> Result<Vec<CapabilityGrant>> {
        let role = self.directory.role_of(&actor.id)?;
        Ok(self.access.matrix().grants_for(role))
    }
}

/// Turn a missing collaborator entry into a precondition failure; pass
/// other errors through.
fn precondition(err: VaultError, reason: &str) -> VaultError {
    match err {
        VaultError::NotFound(_) => VaultError::Precondition(reason.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::identity::MemoryDirectory;
    use crate::repository::MemoryRepository;
    use crate::test_keys;

    struct Fixture {
        pipeline: DistributionPipeline,
        audit: Arc<AuditLog>,
        repository: Arc<MemoryRepository>,
        alice: Identity,
        bob: Identity,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(MemoryDirectory::new());
        let alice = directory
            .provision_with_keys("alice", Role::Author, &test_keys::author().private)
            .unwrap();
        let bob = directory
            .provision_with_keys("bob", Role::Custodian, &test_keys::custodian().private)
            .unwrap();
        let repository = Arc::new(MemoryRepository::new());
        let audit = Arc::new(AuditLog::new());
        let pipeline = DistributionPipeline::new(
            VaultConfig::default(),
            directory,
            repository.clone(),
            audit.clone(),
        )
        .unwrap();
        Fixture {
            pipeline,
            audit,
            repository,
            alice,
            bob,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn validation_runs_after_authorization_and_stores_nothing() {
        let f = fixture();
        let err = f.pipeline.upload(&f.alice, "T", "S", date(), b"").unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        let err = f.pipeline.upload(&f.alice, "  ", "S", date(), b"x").unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert!(f.repository.is_empty());
        // create + encrypt, twice
        assert_eq!(f.audit.len(), 4);
    }

    #[test]
    fn oversized_documents_are_rejected() {
        let directory = Arc::new(MemoryDirectory::new());
        let alice = directory
            .provision_with_keys("alice", Role::Author, &test_keys::author().private)
            .unwrap();
        let config = VaultConfig {
            max_document_bytes: 4,
            ..VaultConfig::default()
        };
        let pipeline = DistributionPipeline::new(
            config,
            directory,
            Arc::new(MemoryRepository::new()),
            Arc::new(AuditLog::new()),
        )
        .unwrap();
        assert!(matches!(
            pipeline.upload(&alice, "T", "S", date(), b"12345"),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn upload_stores_a_pending_radix64_record() {
        let f = fixture();
        let id = f.pipeline.upload(&f.alice, " Finals ", "CS301", date(), b"Q1").unwrap();
        let record = f.repository.fetch_by_id(id).unwrap().unwrap();

        assert_eq!(record.title, "Finals");
        assert_eq!(record.author_id, "alice");
        assert_eq!(record.status, DocumentStatus::Pending);
        let wrapped = repository::decode_field("k", &record.wrapped_content_key).unwrap();
        assert_eq!(wrapped.len(), 256);
        let signature = repository::decode_field("s", &record.signature).unwrap();
        assert_eq!(signature.len(), 256);
        assert_ne!(repository::decode_field("c", &record.ciphertext).unwrap(), b"Q1");
    }

    #[test]
    fn missing_document_is_not_found() {
        let f = fixture();
        assert!(matches!(f.pipeline.retrieve(&f.bob, 42), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn author_cannot_retrieve() {
        let f = fixture();
        let id = f.pipeline.upload(&f.alice, "T", "S", date(), b"paper").unwrap();
        let err = f.pipeline.retrieve(&f.alice, id).unwrap_err();
        assert!(matches!(
            err,
            VaultError::AccessDenied {
                role: Role::Author,
                action: Action::Decrypt,
                ..
            }
        ));
    }

    #[test]
    fn listings_are_newest_first_and_scoped() {
        let f = fixture();
        let first = f.pipeline.upload(&f.alice, "Midterm", "CS301", date(), b"a").unwrap();
        let second = f.pipeline.upload(&f.alice, "Final", "CS301", date(), b"b").unwrap();

        let all = f.pipeline.list_documents(&f.bob).unwrap();
        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![second, first]);

        let mine = f.pipeline.list_authored(&f.alice).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(f.pipeline.list_authored(&f.bob).unwrap().is_empty());
    }

    #[test]
    fn permissions_reflect_the_actor_role() {
        let f = fixture();
        let grants = f.pipeline.permissions(&f.bob).unwrap();
        let document = grants
            .iter()
            .find(|g| g.resource_type == ResourceType::Document)
            .unwrap();
        assert!(document.capabilities.allows(Action::Decrypt));
        assert!(!document.capabilities.allows(Action::Create));
    }
}
