//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::signature::SignaturePadding;
use crate::wrap::WrapPadding;

/// Default upper bound on a single document body (16 MiB).
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024;

/// Settings fixed for the lifetime of a pipeline.
///
/// The padding defaults reproduce records written by earlier deployments.
/// Changing either padding makes previously stored documents unreadable,
/// since records do not carry their padding scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Padding for wrapping content keys.
    pub wrap_padding: WrapPadding,
    /// Padding for authorship signatures.
    pub signature_padding: SignaturePadding,
    /// Largest plaintext accepted by upload.
    pub max_document_bytes: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            wrap_padding: WrapPadding::Pkcs1v15,
            signature_padding: SignaturePadding::Pkcs1v15,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

impl VaultConfig {
    /// OAEP wrapping and PSS signatures.
    pub fn hardened() -> Self {
        Self {
            wrap_padding: WrapPadding::OaepSha256,
            signature_padding: SignaturePadding::Pss,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| VaultError::Validation(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_document_bytes == 0 {
            return Err(VaultError::Validation("max_document_bytes must be positive".into()));
        }
        Ok(())
    }
}
