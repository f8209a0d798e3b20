//! Per-hostname certificate rationalization
//!
//! Drives each hostname to exactly one personal certificate that is valid
//! beyond the renewal window and present in the trust store:
//!
//! 1. Lookup by subject; nothing found means issue.
//! 2. Several found: keep the latest expiry, delete the rest, re-read.
//! 3. Survivor expires within the window: delete it and issue.
//! 4. Issue a new self-signed certificate.
//! 5. Publish the result into the trust store if it is not there yet.
//!
//! The backends have no "extend" operation, so renewal is always
//! issue-new + retire-old. Binding the result to the site is left to the
//! caller.

use localsite_core::{CertificateOutcome, CertificateRecord};
use time::{Duration, OffsetDateTime};

use super::store::{CertError, CertificateStore, Result};

/// Certificates expiring within this many days are replaced
pub const RENEWAL_WINDOW_DAYS: i64 = 30;

/// The certificate one hostname ends up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rationalized {
    pub record: CertificateRecord,
    pub outcome: CertificateOutcome,
    pub duplicates_removed: usize,
}

/// Index of the record to keep: the latest `not_after`, earliest position on ties.
pub fn select_keeper(records: &[CertificateRecord]) -> Option<usize> {
    let mut keeper = 0;
    let first = records.first()?;
    let mut latest = first.not_after;
    for (idx, record) in records.iter().enumerate().skip(1) {
        if record.not_after > latest {
            keeper = idx;
            latest = record.not_after;
        }
    }
    Some(keeper)
}

pub struct CertificateRationalizer<'a> {
    store: &'a dyn CertificateStore,
    renewal_window: Duration,
}

impl<'a> CertificateRationalizer<'a> {
    pub fn new(store: &'a dyn CertificateStore) -> Self {
        Self {
            store,
            renewal_window: Duration::days(RENEWAL_WINDOW_DAYS),
        }
    }

    pub fn with_renewal_window(mut self, window: Duration) -> Self {
        self.renewal_window = window;
        self
    }

    pub fn rationalize(&self, hostname: &str, now: OffsetDateTime) -> Result<Rationalized> {
        let found = self.store.find_by_subject(hostname)?;
        tracing::debug!(hostname, count = found.len(), "Looked up certificates");

        let mut duplicates_removed = 0;
        let survivor = if found.len() > 1 {
            let keeper = select_keeper(&found).unwrap_or(0);
            for (idx, record) in found.iter().enumerate() {
                if idx != keeper {
                    tracing::info!(
                        hostname,
                        thumbprint = %record.thumbprint,
                        not_after = %record.not_after,
                        "Deleting redundant certificate"
                    );
                    self.retire(record)?;
                    duplicates_removed += 1;
                }
            }

            // Deleting may have shuffled the store; read the keeper back.
            let keeper_thumbprint = &found[keeper].thumbprint;
            self.store
                .find_by_subject(hostname)?
                .into_iter()
                .find(|r| &r.thumbprint == keeper_thumbprint)
        } else {
            found.into_iter().next()
        };

        let (record, outcome) = match survivor {
            None => (self.issue(hostname)?, CertificateOutcome::Issued),
            Some(current) if current.expires_within(now, self.renewal_window) => {
                tracing::info!(
                    hostname,
                    thumbprint = %current.thumbprint,
                    days_left = current.days_until_expiry(now),
                    "Certificate due for renewal"
                );
                self.retire(&current)?;
                (self.issue(hostname)?, CertificateOutcome::Renewed)
            }
            Some(current) => {
                tracing::debug!(hostname, thumbprint = %current.thumbprint, "Reusing certificate");
                (current, CertificateOutcome::Reused)
            }
        };

        self.publish(&record)?;

        Ok(Rationalized {
            record,
            outcome,
            duplicates_removed,
        })
    }

    fn issue(&self, hostname: &str) -> Result<CertificateRecord> {
        let record = self.store.create(hostname)?;
        tracing::info!(
            hostname,
            thumbprint = %record.thumbprint,
            not_after = %record.not_after,
            "Issued self-signed certificate"
        );
        Ok(record)
    }

    /// Delete a personal certificate and its trust-store copy. Already-gone is fine.
    fn retire(&self, record: &CertificateRecord) -> Result<()> {
        tolerate_missing(self.store.delete(record))?;
        if let Some(trusted) = self.store.find_in_trust(&record.thumbprint)? {
            tolerate_missing(self.store.delete(&trusted))?;
        }
        Ok(())
    }

    fn publish(&self, record: &CertificateRecord) -> Result<()> {
        if self.store.is_trusted(&record.thumbprint)? {
            return Ok(());
        }
        self.store.install_to_trust(record)?;
        tracing::info!(thumbprint = %record.thumbprint, "Installed certificate into trust store");
        Ok(())
    }
}

fn tolerate_missing(result: Result<()>) -> Result<()> {
    match result {
        Err(CertError::NotFound(thumbprint)) => {
            tracing::warn!(%thumbprint, "Certificate already deleted");
            Ok(())
        }
        other => other,
    }
}
