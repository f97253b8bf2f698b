// Reads the GitHub App private key from disk.

use regtoken_common::{TokenError, TokenResult};
use std::fmt;
use std::path::Path;

/// PEM-encoded private key bytes as read from disk. Never printed.
#[derive(Clone)]
pub struct PrivateKeyPem(Vec<u8>);

impl PrivateKeyPem {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKeyPem(<{} bytes>)", self.0.len())
    }
}

/// Read the key file. Parsing is left to the signer.
pub fn load_private_key(path: &Path) -> TokenResult<PrivateKeyPem> {
    let bytes = std::fs::read(path).map_err(|source| TokenError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Loaded GitHub App private key");
    Ok(PrivateKeyPem(bytes))
}
