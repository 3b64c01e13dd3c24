//! Tests for the pluggable AuditSink / forward sink functionality.

mod common;

use std::io::{BufRead, BufReader};
use std::sync::{Arc, Mutex};

use common::{exam_date, Harness};
use papervault::audit::AuditError;
use papervault::{Action, AuditRecord, AuditSink, FileAuditSink};

/// A test sink that collects records into a shared Vec.
struct SharedVecSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl AuditSink for SharedVecSink {
    fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

#[test]
fn test_forward_sink_receives_records() {
    let h = Harness::new();
    let records = Arc::new(Mutex::new(Vec::new()));
    h.audit.add_forward_sink(Box::new(SharedVecSink {
        records: Arc::clone(&records),
    }));

    let id = h.pipeline.upload(&h.alice, "T", "S", exam_date(), b"paper").unwrap();
    h.pipeline.retrieve(&h.bob, id).unwrap();

    // Primary log has the records
    assert_eq!(h.audit.len(), 4);

    // Forward sink also received them, in order
    let collected = records.lock().unwrap();
    let actions: Vec<Action> = collected.iter().map(|r| r.action).collect();
    assert_eq!(actions, vec![Action::Create, Action::Encrypt, Action::Read, Action::Decrypt]);
}

#[test]
fn test_file_sink_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    let h = Harness::new();
    h.audit.add_forward_sink(Box::new(FileAuditSink::new(&path).unwrap()));

    let id = h.pipeline.upload(&h.alice, "T", "S", exam_date(), b"paper").unwrap();
    let _ = h.pipeline.retrieve(&h.carol, id);

    let file = std::fs::File::open(&path).unwrap();
    let lines: Vec<AuditRecord> = BufReader::new(file)
        .lines()
        .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2].actor_id, "carol");
    assert!(!lines[2].success);
    assert_eq!(lines[2].resource_id, Some(id));
    assert_eq!(lines, h.audit.snapshot());
}

#[test]
fn test_file_sink_appends_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    for _ in 0..2 {
        let h = Harness::new();
        h.audit.add_forward_sink(Box::new(FileAuditSink::new(&path).unwrap()));
        let _ = h.pipeline.list_documents(&h.bob);
    }

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 2);
}
