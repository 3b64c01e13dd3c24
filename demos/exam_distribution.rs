//! Minimal example: one paper from author to custodian.
//!
//! Demonstrates upload, retrieval, a denied access attempt, and a
//! file-backed audit trail.
//! Run with: `RUST_LOG=papervault=debug cargo run --example exam_distribution`

use std::sync::Arc;

use chrono::NaiveDate;
use papervault::{
    AuditLog, DistributionPipeline, FileAuditSink, MemoryDirectory, MemoryRepository, Role,
    VaultConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 1. Provision identities (normally done by the registration flow)
    let directory = Arc::new(MemoryDirectory::new());
    let alice = directory.provision("alice", Role::Author)?;
    let bob = directory.provision("bob", Role::Custodian)?;
    let carol = directory.provision("carol", Role::Restricted)?;

    // 2. Audit trail, mirrored to a file
    let audit = Arc::new(AuditLog::new());
    let audit_path = std::env::temp_dir().join("papervault_audit.jsonl");
    audit.add_forward_sink(Box::new(FileAuditSink::new(&audit_path)?));

    let pipeline = DistributionPipeline::new(
        VaultConfig::default(),
        directory,
        Arc::new(MemoryRepository::new()),
        audit.clone(),
    )?;

    // 3. alice uploads
    let exam_date = NaiveDate::from_ymd_opt(2025, 6, 1).ok_or("invalid date")?;
    let paper = b"Exam: Algorithms, Q1..Q5";
    let id = pipeline.upload(&alice, "Algorithms Final", "CS301", exam_date, paper)?;
    println!("Uploaded paper {id}");

    // 4. bob retrieves
    let paper = pipeline.retrieve(&bob, id)?;
    println!("bob read: {}", String::from_utf8_lossy(&paper));

    // 5. carol is denied
    if let Err(e) = pipeline.retrieve(&carol, id) {
        println!("carol: {}", e.public_message());
    }

    // 6. Audit log
    println!("Audit log: {} record(s)", audit.len());
    for record in audit.snapshot() {
        println!(
            "  {} {} {} -> {}",
            record.actor_id,
            record.action,
            record.resource_type,
            if record.success { "granted" } else { "denied" }
        );
    }
    println!("Full audit also written to: {}", audit_path.display());

    Ok(())
}
