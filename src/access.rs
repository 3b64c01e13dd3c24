//! Role-based access enforcement.
//!
//! A static role × resource-type capability matrix decides every request.
//! Each decision, allowed or denied, produces exactly one audit record
//! before control returns to the caller, so the trail records attempts and
//! not just successes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audit::{AuditRecord, AuditSink};
use crate::error::{Result, VaultError};
use crate::identity::Identity;

/// The three roles known to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Writes and uploads exam papers.
    Author,
    /// The single role that can open uploaded papers.
    Custodian,
    /// Everyone else. Holds no keys.
    Restricted,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Author, Role::Custodian, Role::Restricted];

    /// Whether identities of this role own a keypair.
    pub fn holds_keys(self) -> bool {
        matches!(self, Role::Author | Role::Custodian)
    }
}

/// Kinds of resource guarded by the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Document,
    KeyMaterial,
    Session,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [
        ResourceType::Document,
        ResourceType::KeyMaterial,
        ResourceType::Session,
    ];
}

/// A single capability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Encrypt,
    Decrypt,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Encrypt,
        Action::Decrypt,
    ];

    fn bit(self) -> u8 {
        match self {
            Action::Create => 1 << 0,
            Action::Read => 1 << 1,
            Action::Update => 1 << 2,
            Action::Delete => 1 << 3,
            Action::Encrypt => 1 << 4,
            Action::Decrypt => 1 << 5,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Encrypt => "encrypt",
            Action::Decrypt => "decrypt",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of capability bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities(u8);

impl Capabilities {
    pub fn of(actions: &[Action]) -> Self {
        Self(actions.iter().fold(0, |bits, a| bits | a.bit()))
    }

    pub fn allows(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    /// The allowed actions in canonical order.
    pub fn actions(self) -> Vec<Action> {
        Action::ALL.into_iter().filter(|a| self.allows(*a)).collect()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.actions()).finish()
    }
}

/// One row of the capability matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub role: Role,
    pub resource_type: ResourceType,
    pub capabilities: Capabilities,
}

/// The role × resource-type table. Lookup is exact match; a missing row
/// grants nothing.
#[derive(Debug, Clone, Default)]
pub struct CapabilityMatrix {
    rows: HashMap<(Role, ResourceType), Capabilities>,
}

impl CapabilityMatrix {
    /// An empty matrix: every request is denied.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from explicit rows. A later row for the same key replaces an
    /// earlier one.
    pub fn from_grants(grants: impl IntoIterator<Item = CapabilityGrant>) -> Self {
        let rows = grants
            .into_iter()
            .map(|g| ((g.role, g.resource_type), g.capabilities))
            .collect();
        Self { rows }
    }

    /// The provisioning seed.
    ///
    /// | role       | Document            | KeyMaterial | Session                   |
    /// |------------|---------------------|-------------|---------------------------|
    /// | Author     | create,read,encrypt | create      | read                      |
    /// | Custodian  | read,update,decrypt | decrypt     | create,read,update,delete |
    /// | Restricted | -                   | -           | read                      |
    pub fn seed() -> Self {
        use Action::*;
        use ResourceType::*;
        use Role::*;

        let grant = |role, resource_type, actions: &[Action]| CapabilityGrant {
            role,
            resource_type,
            capabilities: Capabilities::of(actions),
        };

        Self::from_grants([
            grant(Author, Document, &[Create, Read, Encrypt]),
            grant(Author, KeyMaterial, &[Create]),
            grant(Author, Session, &[Read]),
            grant(Custodian, Document, &[Read, Update, Decrypt]),
            grant(Custodian, KeyMaterial, &[Decrypt]),
            grant(Custodian, Session, &[Create, Read, Update, Delete]),
            grant(Restricted, Document, &[]),
            grant(Restricted, KeyMaterial, &[]),
            grant(Restricted, Session, &[Read]),
        ])
    }

    pub fn lookup(&self, role: Role, resource_type: ResourceType) -> Option<Capabilities> {
        self.rows.get(&(role, resource_type)).copied()
    }

    /// Every row for `role`, in resource-type order.
    pub fn grants_for(&self, role: Role) -> Vec<CapabilityGrant> {
        ResourceType::ALL
            .into_iter()
            .filter_map(|resource_type| {
                self.lookup(role, resource_type).map(|capabilities| CapabilityGrant {
                    role,
                    resource_type,
                    capabilities,
                })
            })
            .collect()
    }
}

/// Evaluates the matrix and writes the audit trail.
#[derive(Clone)]
pub struct AccessController {
    matrix: Arc<CapabilityMatrix>,
    audit: Arc<dyn AuditSink>,
}

impl fmt::Debug for AccessController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessController").field("matrix", &self.matrix).finish_non_exhaustive()
    }
}

impl AccessController {
    pub fn new(matrix: CapabilityMatrix, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            matrix: Arc::new(matrix),
            audit,
        }
    }

    pub fn matrix(&self) -> &CapabilityMatrix {
        &self.matrix
    }

    /// Decide whether `actor` may perform `action` on `resource_type`.
    ///
    /// Appends exactly one audit record whatever the outcome. A denial must
    /// end the caller's operation.
    pub fn enforce(
        &self,
        actor: &Identity,
        resource_type: ResourceType,
        action: Action,
        resource_id: Option<u64>,
    ) -> Result<()> {
        let decision = match self.matrix.lookup(actor.role, resource_type) {
            None => Err(format!("no capabilities defined for {} on {}", actor.role, resource_type)),
            Some(caps) if !caps.allows(action) => Err(format!(
                "access denied: {} role cannot {} {}",
                actor.role, action, resource_type
            )),
            Some(_) => Ok(()),
        };

        match decision {
            Ok(()) => {
                self.record_outcome(
                    actor,
                    resource_type,
                    action,
                    resource_id,
                    true,
                    "permission granted",
                );
                debug!(actor = %actor.id, %resource_type, %action, "access granted");
                Ok(())
            }
            Err(reason) => Err(self.deny(actor, resource_type, action, resource_id, &reason)),
        }
    }

    /// Record a denial decided before the matrix is consulted, such as an
    /// identity whose claimed role the directory does not back, and return
    /// the error the caller must stop on.
    pub fn deny(
        &self,
        actor: &Identity,
        resource_type: ResourceType,
        action: Action,
        resource_id: Option<u64>,
        reason: &str,
    ) -> VaultError {
        self.record_outcome(actor, resource_type, action, resource_id, false, reason);
        warn!(actor = %actor.id, role = %actor.role, %resource_type, %action, "access denied");
        VaultError::AccessDenied {
            role: actor.role,
            resource_type,
            action,
        }
    }

    /// Append a record for an outcome decided outside the matrix, such as a
    /// failed signature check. Sink failures are logged, never propagated.
    pub fn record_outcome(
        &self,
        actor: &Identity,
        resource_type: ResourceType,
        action: Action,
        resource_id: Option<u64>,
        success: bool,
        detail: &str,
    ) {
        let record = AuditRecord {
            actor_id: actor.id.clone(),
            action,
            resource_type,
            resource_id,
            success,
            detail: detail.to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.audit.append(record) {
            warn!(error = %e, actor = %actor.id, "failed to append audit record");
        }
    }
}
