//! Identities and the key directory.
//!
//! Identities are provisioned by a registration flow outside the pipeline
//! and are read-only to it. The directory resolves the active custodian's
//! public key, any author's public key, and the invoking actor's own
//! private key.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use crate::access::Role;
use crate::error::{Result, VaultError};
use crate::keys::{self, PrivateKey, PublicKey};

/// Opaque user identifier assigned by the registration flow.
pub type UserId = String;

/// An authenticated principal. Restricted identities carry no public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub role: Role,
    pub public_key: Option<PublicKey>,
}

/// Key lookups the pipeline depends on.
pub trait IdentityDirectory: Send + Sync {
    /// The role a user was provisioned with. Fails `NotFound` for unknown
    /// users.
    fn role_of(&self, user_id: &str) -> Result<Role>;

    /// The public key of the identity currently holding `role`.
    /// Fails `NotFound` when no such identity is provisioned.
    fn current_public_key(&self, role: Role) -> Result<PublicKey>;

    /// The public key of a specific user.
    fn public_key_of(&self, user_id: &str) -> Result<PublicKey>;

    /// The private key of a specific user. Callers must only ask for the
    /// key of the identity they are acting as.
    fn private_key_of(&self, user_id: &str) -> Result<PrivateKey>;
}

struct StoredIdentity {
    role: Role,
    public_pem: Option<String>,
    // Stored as plain PEM text, without an at-rest wrapping key.
    private_pem: Option<String>,
}

#[derive(Default)]
struct DirectoryState {
    users: HashMap<UserId, StoredIdentity>,
    active_custodian: Option<UserId>,
}

/// An in-memory directory that stores keys the way a user table would:
/// as PEM text columns.
#[derive(Default)]
pub struct MemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl std::fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let users = self.state.read().map(|s| s.users.len()).ok();
        f.debug_struct("MemoryDirectory").field("users", &users).finish()
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new identity, generating a fresh keypair for Author and
    /// Custodian roles.
    ///
    /// Provisioning a Custodian makes it the active one. Documents wrapped
    /// for a previous custodian cannot be opened by the new one.
    pub fn provision(&self, user_id: impl Into<UserId>, role: Role) -> Result<Identity> {
        let user_id = user_id.into();
        let pair = if role.holds_keys() { Some(keys::generate_keypair()?) } else { None };
        let identity = self.insert(user_id, role, pair.as_ref().map(|p| (&p.private, &p.public)))?;
        info!(user = %identity.id, %role, "identity provisioned");
        Ok(identity)
    }

    /// Register an identity with an existing keypair.
    pub fn provision_with_keys(
        &self,
        user_id: impl Into<UserId>,
        role: Role,
        private: &PrivateKey,
    ) -> Result<Identity> {
        if !role.holds_keys() {
            return Err(VaultError::Validation(format!("{role} identities do not hold keys")));
        }
        let public = private.public_key();
        self.insert(user_id.into(), role, Some((private, &public)))
    }

    fn insert(
        &self,
        user_id: UserId,
        role: Role,
        pair: Option<(&PrivateKey, &PublicKey)>,
    ) -> Result<Identity> {
        if user_id.trim().is_empty() {
            return Err(VaultError::Validation("user id must not be empty".into()));
        }

        let (private_pem, public_pem) = match pair {
            Some((private, public)) => (
                Some(keys::encode_private_key(private)?.as_str().to_owned()),
                Some(keys::encode_public_key(public)?),
            ),
            None => (None, None),
        };

        let mut state = self
            .state
            .write()
            .map_err(|_| VaultError::Persistence("identity store lock poisoned".into()))?;
        if state.users.contains_key(&user_id) {
            return Err(VaultError::Validation(format!("user {user_id} already exists")));
        }

        state.users.insert(
            user_id.clone(),
            StoredIdentity {
                role,
                public_pem,
                private_pem,
            },
        );
        if role == Role::Custodian {
            state.active_custodian = Some(user_id.clone());
        }

        Ok(Identity {
            id: user_id,
            role,
            public_key: pair.map(|(_, public)| public.clone()),
        })
    }

    /// Look up a provisioned identity.
    pub fn identity(&self, user_id: &str) -> Result<Identity> {
        let state = self.read()?;
        let stored = state
            .users
            .get(user_id)
            .ok_or_else(|| VaultError::NotFound(format!("user {user_id}")))?;
        let public_key = stored.public_pem.as_deref().map(keys::decode_public_key).transpose()?;
        Ok(Identity {
            id: user_id.to_string(),
            role: stored.role,
            public_key,
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, DirectoryState>> {
        self.state
            .read()
            .map_err(|_| VaultError::Persistence("identity store lock poisoned".into()))
    }
}

impl IdentityDirectory for MemoryDirectory {
    fn role_of(&self, user_id: &str) -> Result<Role> {
        let state = self.read()?;
        state
            .users
            .get(user_id)
            .map(|u| u.role)
            .ok_or_else(|| VaultError::NotFound(format!("user {user_id}")))
    }

    fn current_public_key(&self, role: Role) -> Result<PublicKey> {
        let state = self.read()?;
        let holder = match role {
            Role::Custodian => state.active_custodian.as_deref(),
            // Other roles have no single active holder; take the first
            // keyed identity in id order so the answer is stable.
            _ => state
                .users
                .iter()
                .filter(|(_, u)| u.role == role && u.public_pem.is_some())
                .map(|(id, _)| id.as_str())
                .min(),
        }
        .ok_or_else(|| VaultError::NotFound(format!("no {role} provisioned")))?;
        let pem = state
            .users
            .get(holder)
            .and_then(|u| u.public_pem.as_deref())
            .ok_or_else(|| VaultError::NotFound(format!("no {role} key")))?;
        keys::decode_public_key(pem)
    }

    fn public_key_of(&self, user_id: &str) -> Result<PublicKey> {
        let state = self.read()?;
        let pem = state
            .users
            .get(user_id)
            .and_then(|u| u.public_pem.as_deref())
            .ok_or_else(|| VaultError::NotFound(format!("public key for {user_id}")))?;
        keys::decode_public_key(pem)
    }

    fn private_key_of(&self, user_id: &str) -> Result<PrivateKey> {
        let state = self.read()?;
        let pem = state
            .users
            .get(user_id)
            .and_then(|u| u.private_pem.as_deref())
            .ok_or_else(|| VaultError::NotFound(format!("private key for {user_id}")))?;
        keys::decode_private_key(pem)
    }
}
