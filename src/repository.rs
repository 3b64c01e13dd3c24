//! Encrypted document records and their storage seam.
//!
//! Binary fields are persisted as radix-64 text, the way they would sit in
//! a text column. Decoding happens only inside the pipeline, right before
//! the bytes are handed to the cipher or the signature check.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::identity::UserId;

/// Identifier assigned by the repository on insert.
pub type DocumentId = u64;

/// Workflow status. Only `Pending` is ever written by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Approved,
    Published,
}

/// A document ready to be stored. The repository assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub subject: String,
    pub author_id: UserId,
    pub exam_date: NaiveDate,
    /// `nonce || ciphertext || tag`, radix-64.
    pub ciphertext: String,
    /// Content key wrapped for the custodian, radix-64.
    pub wrapped_content_key: String,
    /// Author signature over the plaintext, radix-64.
    pub signature: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDocument {
    pub id: DocumentId,
    pub title: String,
    pub subject: String,
    pub author_id: UserId,
    pub exam_date: NaiveDate,
    pub ciphertext: String,
    pub wrapped_content_key: String,
    pub signature: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

/// Listing view of a document. Carries no ciphertext, key or signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub title: String,
    pub subject: String,
    pub author_id: UserId,
    pub exam_date: NaiveDate,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

impl EncryptedDocument {
    fn from_new(id: DocumentId, doc: NewDocument) -> Self {
        Self {
            id,
            title: doc.title,
            subject: doc.subject,
            author_id: doc.author_id,
            exam_date: doc.exam_date,
            ciphertext: doc.ciphertext,
            wrapped_content_key: doc.wrapped_content_key,
            signature: doc.signature,
            status: doc.status,
            created_at: doc.created_at,
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            title: self.title.clone(),
            subject: self.subject.clone(),
            author_id: self.author_id.clone(),
            exam_date: self.exam_date,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Encode bytes for a text column.
pub fn encode_field(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a text column. `field` names the column in the error.
pub fn decode_field(field: &str, text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|_| VaultError::MalformedInput(format!("{field} is not valid radix-64")))
}

/// Document storage.
///
/// `insert` must be atomic: a document is either fully stored or absent.
pub trait DocumentRepository: Send + Sync {
    fn insert(&self, doc: NewDocument) -> Result<DocumentId>;

    fn fetch_by_id(&self, id: DocumentId) -> Result<Option<EncryptedDocument>>;

    /// Every stored document, in id order.
    fn list(&self) -> Result<Vec<EncryptedDocument>>;
}

/// In-memory repository with monotonically increasing ids starting at 1.
#[derive(Debug)]
pub struct MemoryRepository {
    next_id: AtomicU64,
    rows: RwLock<BTreeMap<DocumentId, EncryptedDocument>>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentRepository for MemoryRepository {
    fn insert(&self, doc: NewDocument) -> Result<DocumentId> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| VaultError::Persistence("document store lock poisoned".into()))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        rows.insert(id, EncryptedDocument::from_new(id, doc));
        Ok(id)
    }

    fn fetch_by_id(&self, id: DocumentId) -> Result<Option<EncryptedDocument>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| VaultError::Persistence("document store lock poisoned".into()))?;
        Ok(rows.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<EncryptedDocument>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| VaultError::Persistence("document store lock poisoned".into()))?;
        Ok(rows.values().cloned().collect())
    }
}
