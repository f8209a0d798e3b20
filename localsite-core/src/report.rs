//! Per-run outcome reported back to the caller for logging.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::Thumbprint;

/// What the certificate rationalizer did for one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateOutcome {
    /// No certificate existed; a new one was created.
    Issued,
    /// A valid certificate was kept as-is.
    Reused,
    /// The surviving certificate was close to expiry and got replaced.
    Renewed,
}

impl fmt::Display for CertificateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateOutcome::Issued => f.write_str("issued"),
            CertificateOutcome::Reused => f.write_str("reused"),
            CertificateOutcome::Renewed => f.write_str("renewed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostsOutcome {
    Added,
    /// Covered by a loopback test-domain suffix; never written.
    Skipped,
}

impl fmt::Display for HostsOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostsOutcome::Added => f.write_str("added"),
            HostsOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingReport {
    pub hostname: String,
    pub certificate: CertificateOutcome,
    pub thumbprint: Thumbprint,
    /// Redundant certificates deleted while deduplicating this subject.
    pub duplicates_removed: usize,
    pub hosts: HostsOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub site_name: String,
    pub app_pool_name: String,
    pub app_pool_created: bool,
    /// The site existed at the start of the run and was deleted before rebuilding.
    pub site_recreated: bool,
    pub bindings: Vec<BindingReport>,
}

impl RunResult {
    pub fn binding(&self, hostname: &str) -> Option<&BindingReport> {
        self.bindings.iter().find(|b| b.hostname == hostname)
    }
}
