//! Authorship signatures over the original plaintext.
//!
//! The digest is always taken over the plaintext, never the ciphertext, so a
//! signature stays valid no matter which content key or nonce sealed it.

use rand::rngs::OsRng;
use rsa::{Pkcs1v15Sign, Pss};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};
use crate::keys::{PrivateKey, PublicKey};

/// RSA signature padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePadding {
    /// Deterministic PKCS#1 v1.5 with SHA-256.
    #[default]
    Pkcs1v15,
    /// Randomized PSS with SHA-256.
    Pss,
}

/// Signs and verifies document plaintext.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureService {
    padding: SignaturePadding,
}

impl SignatureService {
    pub fn new(padding: SignaturePadding) -> Self {
        Self { padding }
    }

    /// Sign the SHA-256 digest of `plaintext`.
    pub fn sign(&self, plaintext: &[u8], signer: &PrivateKey) -> Result<Vec<u8>> {
        let digest = Sha256::digest(plaintext);
        let key = signer.inner();
        let signature = match self.padding {
            SignaturePadding::Pkcs1v15 => key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest),
            SignaturePadding::Pss => key.sign_with_rng(&mut OsRng, Pss::new::<Sha256>(), &digest),
        };
        signature.map_err(|_| VaultError::CryptoFailure)
    }

    /// Verify `signature` against the SHA-256 digest of `plaintext`.
    pub fn verify(&self, plaintext: &[u8], signature: &[u8], signer: &PublicKey) -> Result<()> {
        let digest = Sha256::digest(plaintext);
        let key = signer.inner();
        let outcome = match self.padding {
            SignaturePadding::Pkcs1v15 => {
                key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            }
            SignaturePadding::Pss => key.verify(Pss::new::<Sha256>(), &digest, signature),
        };
        outcome.map_err(|_| VaultError::IntegrityError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys;

    const BOTH: [SignaturePadding; 2] = [SignaturePadding::Pkcs1v15, SignaturePadding::Pss];

    #[test]
    fn sign_verify_roundtrip() {
        let author = test_keys::author();
        for padding in BOTH {
            let service = SignatureService::new(padding);
            let signature = service.sign(b"Q1. Define a heap.", &author.private).unwrap();
            assert_eq!(signature.len(), 256);
            service.verify(b"Q1. Define a heap.", &signature, &author.public).unwrap();
        }
    }

    #[test]
    fn altered_plaintext_fails_verification() {
        let author = test_keys::author();
        for padding in BOTH {
            let service = SignatureService::new(padding);
            let signature = service.sign(b"original", &author.private).unwrap();
            assert!(matches!(
                service.verify(b"0riginal", &signature, &author.public),
                Err(VaultError::IntegrityError)
            ));
        }
    }

    #[test]
    fn wrong_signer_fails_verification() {
        let author = test_keys::author();
        let custodian = test_keys::custodian();
        let service = SignatureService::default();
        let signature = service.sign(b"paper", &author.private).unwrap();
        assert!(matches!(
            service.verify(b"paper", &signature, &custodian.public),
            Err(VaultError::IntegrityError)
        ));
    }

    #[test]
    fn pkcs1v15_is_deterministic_and_pss_is_not() {
        let author = test_keys::author();
        let pkcs = SignatureService::new(SignaturePadding::Pkcs1v15);
        assert_eq!(
            pkcs.sign(b"same", &author.private).unwrap(),
            pkcs.sign(b"same", &author.private).unwrap()
        );

        let pss = SignatureService::new(SignaturePadding::Pss);
        assert_ne!(
            pss.sign(b"same", &author.private).unwrap(),
            pss.sign(b"same", &author.private).unwrap()
        );
    }
}
