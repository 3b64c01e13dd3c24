//! Symmetric content encryption.
//!
//! This module and `keys` are the only places that touch raw key bytes.
//! Every document body is sealed here, under a one-time content key that
//! is generated fresh for that document.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption, no associated data)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per call via `SystemRandom`
//! - **Tag**: 128-bit (16 bytes)
//! - **Key size**: 256 bits (32 bytes)

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Size of a content key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// A one-time symmetric key protecting a single document.
///
/// - Not `Clone`. A content key lives for one upload or one retrieval.
/// - Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentKey {
    bytes: [u8; KEY_LEN],
}

impl ContentKey {
    /// Construct a key from raw bytes, e.g. after unwrapping.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Borrow the raw key bytes. `pub(crate)`: raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

/// Authenticated symmetric encryption of document bytes.
///
/// The pipeline only ever talks to this trait, which keeps the cipher
/// swappable and lets callers observe how often it is invoked.
pub trait ContentCipher: Send + Sync {
    /// Produce a fresh random content key.
    fn generate_key(&self) -> Result<ContentKey>;

    /// Seal `plaintext`. Output layout: `[ nonce ][ ciphertext + tag ]`.
    fn encrypt(&self, plaintext: &[u8], key: &ContentKey) -> Result<Vec<u8>>;

    /// Open bytes produced by [`ContentCipher::encrypt`].
    fn decrypt(&self, sealed: &[u8], key: &ContentKey) -> Result<Vec<u8>>;
}

/// AES-256-GCM backed by `ring`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmCipher;

impl ContentCipher for AesGcmCipher {
    fn generate_key(&self) -> Result<ContentKey> {
        generate_content_key()
    }

    fn encrypt(&self, plaintext: &[u8], key: &ContentKey) -> Result<Vec<u8>> {
        encrypt(key, plaintext)
    }

    fn decrypt(&self, sealed: &[u8], key: &ContentKey) -> Result<Vec<u8>> {
        decrypt(key, sealed)
    }
}

/// Fresh random nonce bytes. Never cached, never counter-based.
fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut buf = [0u8; NONCE_LEN];
    SystemRandom::new().fill(&mut buf).map_err(|_| VaultError::CryptoFailure)?;
    Ok(buf)
}

fn less_safe_key(key: &ContentKey) -> Result<LessSafeKey> {
    let unbound =
        UnboundKey::new(ALGORITHM, key.as_bytes()).map_err(|_| VaultError::CryptoFailure)?;
    Ok(LessSafeKey::new(unbound))
}

/// Generate a cryptographically secure random content key.
pub fn generate_content_key() -> Result<ContentKey> {
    let mut bytes = [0u8; KEY_LEN];
    SystemRandom::new().fill(&mut bytes).map_err(|_| VaultError::CryptoFailure)?;
    Ok(ContentKey { bytes })
}

/// Encrypt `plaintext` under `key` with a fresh nonce.
///
/// # Layout of returned bytes
/// ```text
/// [ nonce (12 bytes) ][ ciphertext ][ GCM tag (16 bytes) ]
/// ```
pub fn encrypt(key: &ContentKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let sealing_key = less_safe_key(key)?;
    let nonce_bytes = generate_nonce()?;

    let mut output: Vec<u8> = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(plaintext);

    let tag = sealing_key
        .seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            aead::Aad::empty(),
            &mut output[NONCE_LEN..],
        )
        .map_err(|_| VaultError::CryptoFailure)?;
    output.extend_from_slice(tag.as_ref());

    Ok(output)
}

/// Decrypt bytes in the layout produced by [`encrypt`].
///
/// Wrong key, truncated input and tampered bytes all fail the same way and
/// no partial plaintext is returned.
pub fn decrypt(key: &ContentKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(VaultError::CryptoFailure);
    }

    let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);
    let nonce =
        Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| VaultError::CryptoFailure)?;
    let opening_key = less_safe_key(key)?;

    // Opened in place: the plaintext is the prefix of `payload`, so the
    // returned buffer is the only copy.
    let mut payload = body.to_vec();
    let plaintext_len = opening_key
        .open_in_place(nonce, aead::Aad::empty(), &mut payload)
        .map_err(|_| VaultError::CryptoFailure)?
        .len();
    payload.truncate(plaintext_len);

    Ok(payload)
}
