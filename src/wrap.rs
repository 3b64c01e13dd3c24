//! Envelope key wrapping.
//!
//! The one-time content key is encrypted directly under the recipient's RSA
//! public key. Output length is fixed by the modulus (256 bytes for
//! RSA-2048) regardless of the content key's value.
//!
//! Unwrapping with a private key that does not match the wrapping key fails
//! the padding check. A result that decodes but is not exactly one content
//! key long is rejected too, so a "plausible" wrong key is never returned.

use rand::rngs::OsRng;
use rsa::{Oaep, Pkcs1v15Encrypt};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::{ContentKey, KEY_LEN};
use crate::error::{Result, VaultError};
use crate::keys::{PrivateKey, PublicKey};

/// RSA encryption padding used for key wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapPadding {
    /// PKCS#1 v1.5. Compatible with records produced by earlier deployments.
    #[default]
    Pkcs1v15,
    /// OAEP with SHA-256 and MGF1-SHA-256.
    OaepSha256,
}

/// Protects a content key for a single recipient.
pub trait KeyWrapper: Send + Sync {
    /// Encrypt `content_key` for the holder of `recipient`'s private key.
    fn wrap(&self, content_key: &ContentKey, recipient: &PublicKey) -> Result<Vec<u8>>;

    /// Recover a content key previously wrapped for `recipient`.
    fn unwrap(&self, wrapped: &[u8], recipient: &PrivateKey) -> Result<ContentKey>;
}

/// RSA key wrapping with a fixed padding scheme.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaKeyWrapper {
    padding: WrapPadding,
}

impl RsaKeyWrapper {
    pub fn new(padding: WrapPadding) -> Self {
        Self { padding }
    }
}

impl KeyWrapper for RsaKeyWrapper {
    fn wrap(&self, content_key: &ContentKey, recipient: &PublicKey) -> Result<Vec<u8>> {
        let key = recipient.inner();
        let bytes = content_key.as_bytes();
        let wrapped = match self.padding {
            WrapPadding::Pkcs1v15 => key.encrypt(&mut OsRng, Pkcs1v15Encrypt, bytes),
            WrapPadding::OaepSha256 => key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), bytes),
        };
        wrapped.map_err(|_| VaultError::CryptoFailure)
    }

    fn unwrap(&self, wrapped: &[u8], recipient: &PrivateKey) -> Result<ContentKey> {
        let key = recipient.inner();
        let recovered = match self.padding {
            WrapPadding::Pkcs1v15 => key.decrypt(Pkcs1v15Encrypt, wrapped),
            WrapPadding::OaepSha256 => key.decrypt(Oaep::new::<Sha256>(), wrapped),
        }
        .map(Zeroizing::new)
        .map_err(|_| VaultError::CryptoFailure)?;

        let bytes: [u8; KEY_LEN] = recovered
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::CryptoFailure)?;
        Ok(ContentKey::from_bytes(bytes))
    }
}
