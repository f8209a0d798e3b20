//! Certificate lifecycle
//!
//! - **Store**: the [`CertificateStore`] seam over a personal store plus a trust store
//! - **PEM directory**: portable store backed by PEM files, generated with `rcgen`
//! - **PowerShell**: Windows `Cert:\LocalMachine` store driven through PowerShell
//! - **Rationalizer**: dedup, renewal, issue and trust publication per hostname

mod pem_store;
mod powershell;
mod rationalizer;
mod store;

pub use pem_store::PemDirStore;
pub use powershell::PowerShellCertStore;
pub use rationalizer::{CertificateRationalizer, RENEWAL_WINDOW_DAYS, Rationalized};
pub use store::{CertError, CertificateStore, DEFAULT_VALIDITY_DAYS};

#[cfg(test)]
pub(crate) use store::testing;
