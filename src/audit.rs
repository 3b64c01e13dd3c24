//! Immutable audit logging.
//!
//! Records every authorization decision, granted or denied. The log is
//! append-only: nothing in the crate mutates or removes a record once it
//! has been appended. Records can be forwarded to pluggable sinks (files,
//! databases, ...).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::access::{Action, ResourceType};
use crate::identity::UserId;

/// Failure to persist an audit record.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit record could not be written: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit record could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A sink that receives audit records.
///
/// Each `append` must be an atomic unit at the storage layer. Sinks are
/// shared between concurrent pipeline calls, hence `&self` + `Sync`.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// A permanent record of one access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Who attempted the action.
    pub actor_id: UserId,
    /// What they attempted.
    pub action: Action,
    /// What kind of resource it targeted.
    pub resource_type: ResourceType,
    /// The specific resource, when the attempt names one.
    pub resource_id: Option<u64>,
    /// Whether the attempt was allowed.
    pub success: bool,
    /// Human-readable reason for the decision.
    pub detail: String,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
}

/// An in-memory append-only log.
/// Can forward records to additional sinks via `add_forward_sink`.
#[derive(Default)]
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
    forward_sinks: Mutex<Vec<Box<dyn AuditSink>>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("records", &self.len())
            .field("forward_sinks", &self.forward_sinks.lock().map(|s| s.len()).ok())
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to receive a copy of every record, without replacing the
    /// in-memory log.
    pub fn add_forward_sink(&self, sink: Box<dyn AuditSink>) {
        if let Ok(mut sinks) = self.forward_sinks.lock() {
            sinks.push(sink);
        }
    }

    /// Return the number of records in the log.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every record, oldest first.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The most recent `limit` records for `actor_id`, newest first.
    pub fn records_for(&self, actor_id: &str, limit: usize) -> Vec<AuditRecord> {
        let Ok(records) = self.records.lock() else {
            return Vec::new();
        };
        records
            .iter()
            .rev()
            .filter(|r| r.actor_id == actor_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

impl AuditSink for AuditLog {
    /// Append to the in-memory log, then forward. A failing forward sink is
    /// logged and skipped; the in-memory copy is the record of truth.
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        if let Ok(sinks) = self.forward_sinks.lock() {
            for sink in sinks.iter() {
                if let Err(e) = sink.append(record.clone()) {
                    warn!(error = %e, actor = %record.actor_id, "audit forward sink failed");
                }
            }
        }
        self.records
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".into()))?
            .push(record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| AuditError::Unavailable("audit file lock poisoned".into()))?;
        // One write per record so concurrent appends never interleave.
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
