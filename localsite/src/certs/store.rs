use std::path::PathBuf;

use localsite_core::{CertificateRecord, Thumbprint};
use thiserror::Error;

/// Validity of newly issued self-signed certificates (1 year)
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("Certificate {0} not found")]
    NotFound(Thumbprint),

    #[error("Failed to read {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to write {0}: {1}")]
    FileWrite(PathBuf, std::io::Error),

    #[error("Failed to generate certificate: {0}")]
    Generation(String),

    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("Certificate store command failed: {0}")]
    Command(String),
}

pub type Result<T> = std::result::Result<T, CertError>;

/// A personal certificate store paired with a trust store.
///
/// Lookups by subject only look at the personal store. Everything is
/// synchronous; a call returns once the store has committed the change.
pub trait CertificateStore {
    /// Personal-store certificates whose subject CN is `cn`, in no particular order.
    fn find_by_subject(&self, cn: &str) -> Result<Vec<CertificateRecord>>;

    /// Issue a self-signed `CN=<cn>` certificate into the personal store.
    fn create(&self, cn: &str) -> Result<CertificateRecord>;

    /// Remove `record` from the store it lives in. [`CertError::NotFound`] when already gone.
    fn delete(&self, record: &CertificateRecord) -> Result<()>;

    /// Copy the personal certificate with `record`'s thumbprint into the trust
    /// store. No-op when the trust store already holds it.
    fn install_to_trust(&self, record: &CertificateRecord) -> Result<()>;

    fn find_in_trust(&self, thumbprint: &Thumbprint) -> Result<Option<CertificateRecord>>;

    fn is_trusted(&self, thumbprint: &Thumbprint) -> Result<bool> {
        Ok(self.find_in_trust(thumbprint)?.is_some())
    }
}
