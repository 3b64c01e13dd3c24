//! Shared harness for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use papervault::crypto::{AesGcmCipher, ContentCipher, ContentKey};
use papervault::keys::{self, KeyPair, PrivateKey, PublicKey};
use papervault::repository::{DocumentId, DocumentRepository, EncryptedDocument, NewDocument};
use papervault::wrap::{KeyWrapper, RsaKeyWrapper};
use papervault::{
    AuditLog, DistributionPipeline, Identity, MemoryDirectory, MemoryRepository, Result, Role,
    VaultConfig,
};

/// Keypairs are generated once per test binary.
pub fn author_keys() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| keys::generate_keypair().unwrap())
}

pub fn custodian_keys() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| keys::generate_keypair().unwrap())
}

pub fn second_custodian_keys() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| keys::generate_keypair().unwrap())
}

pub fn exam_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

/// Counts every call to the content cipher.
#[derive(Default)]
pub struct CountingCipher {
    inner: AesGcmCipher,
    pub generated: AtomicUsize,
    pub encrypted: AtomicUsize,
    pub decrypted: AtomicUsize,
}

impl CountingCipher {
    pub fn total(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
            + self.encrypted.load(Ordering::SeqCst)
            + self.decrypted.load(Ordering::SeqCst)
    }
}

impl ContentCipher for CountingCipher {
    fn generate_key(&self) -> Result<ContentKey> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        self.inner.generate_key()
    }

    fn encrypt(&self, plaintext: &[u8], key: &ContentKey) -> Result<Vec<u8>> {
        self.encrypted.fetch_add(1, Ordering::SeqCst);
        self.inner.encrypt(plaintext, key)
    }

    fn decrypt(&self, sealed: &[u8], key: &ContentKey) -> Result<Vec<u8>> {
        self.decrypted.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(sealed, key)
    }
}

/// Counts every call to the key wrapper.
#[derive(Default)]
pub struct CountingWrapper {
    inner: RsaKeyWrapper,
    pub wrapped: AtomicUsize,
    pub unwrapped: AtomicUsize,
}

impl CountingWrapper {
    pub fn total(&self) -> usize {
        self.wrapped.load(Ordering::SeqCst) + self.unwrapped.load(Ordering::SeqCst)
    }
}

impl KeyWrapper for CountingWrapper {
    fn wrap(&self, content_key: &ContentKey, recipient: &PublicKey) -> Result<Vec<u8>> {
        self.wrapped.fetch_add(1, Ordering::SeqCst);
        self.inner.wrap(content_key, recipient)
    }

    fn unwrap(&self, wrapped: &[u8], recipient: &PrivateKey) -> Result<ContentKey> {
        self.unwrapped.fetch_add(1, Ordering::SeqCst);
        self.inner.unwrap(wrapped, recipient)
    }
}

/// A repository that rewrites records on the way out, simulating an
/// attacker with write access to storage.
pub struct TamperingRepository {
    inner: MemoryRepository,
    tamper: Box<dyn Fn(&mut EncryptedDocument) + Send + Sync>,
}

impl TamperingRepository {
    pub fn new(tamper: impl Fn(&mut EncryptedDocument) + Send + Sync + 'static) -> Self {
        Self {
            inner: MemoryRepository::new(),
            tamper: Box::new(tamper),
        }
    }
}

impl DocumentRepository for TamperingRepository {
    fn insert(&self, doc: NewDocument) -> Result<DocumentId> {
        self.inner.insert(doc)
    }

    fn fetch_by_id(&self, id: DocumentId) -> Result<Option<EncryptedDocument>> {
        Ok(self.inner.fetch_by_id(id)?.map(|mut doc| {
            (self.tamper)(&mut doc);
            doc
        }))
    }

    fn list(&self) -> Result<Vec<EncryptedDocument>> {
        self.inner.list()
    }
}

/// A pipeline wired to in-memory collaborators with alice (Author), bob
/// (Custodian) and carol (Restricted) provisioned.
pub struct Harness {
    pub pipeline: DistributionPipeline,
    pub directory: Arc<MemoryDirectory>,
    pub audit: Arc<AuditLog>,
    pub cipher: Arc<CountingCipher>,
    pub wrapper: Arc<CountingWrapper>,
    pub alice: Identity,
    pub bob: Identity,
    pub carol: Identity,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_repository(Arc::new(MemoryRepository::new()))
    }

    pub fn with_repository(repository: Arc<dyn DocumentRepository>) -> Self {
        let directory = Arc::new(MemoryDirectory::new());
        let alice = directory
            .provision_with_keys("alice", Role::Author, &author_keys().private)
            .unwrap();
        let bob = directory
            .provision_with_keys("bob", Role::Custodian, &custodian_keys().private)
            .unwrap();
        let carol = directory.provision("carol", Role::Restricted).unwrap();
        Self::assemble(directory, repository, alice, bob, carol)
    }

    pub fn assemble(
        directory: Arc<MemoryDirectory>,
        repository: Arc<dyn DocumentRepository>,
        alice: Identity,
        bob: Identity,
        carol: Identity,
    ) -> Self {
        let audit = Arc::new(AuditLog::new());
        let cipher = Arc::new(CountingCipher::default());
        let wrapper = Arc::new(CountingWrapper::default());
        let pipeline = DistributionPipeline::new(
            VaultConfig::default(),
            directory.clone(),
            repository,
            audit.clone(),
        )
        .unwrap()
            .with_content_cipher(cipher.clone())
            .with_key_wrapper(wrapper.clone());
        Self {
            pipeline,
            directory,
            audit,
            cipher,
            wrapper,
            alice,
            bob,
            carol,
        }
    }

    pub fn crypto_calls(&self) -> usize {
        self.cipher.total() + self.wrapper.total()
    }
}
