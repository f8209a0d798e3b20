use localsite_core::{BindingReport, DesiredConfig, HostsOutcome, RunResult};
use time::{Duration, OffsetDateTime};

use super::{AppPoolManager, ReconcileError, Result, SiteManager};
use crate::acl::{FolderPermissions, site_identities};
use crate::certs::{CertificateStore, RENEWAL_WINDOW_DAYS};
use crate::host::HostAdminClient;
use crate::hosts::{HostsFileEditor, LOOPBACK_IP};

/// Public wildcard domain whose every subdomain already resolves to 127.0.0.1.
pub const DEFAULT_TEST_DOMAIN_SUFFIX: &str = ".localtest.me";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Address hosts entries point at.
    pub loopback_ip: String,
    /// Bindings ending in one of these are never written to the hosts file.
    pub test_domain_suffixes: Vec<String>,
    pub renewal_window: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            loopback_ip: LOOPBACK_IP.to_string(),
            test_domain_suffixes: vec![DEFAULT_TEST_DOMAIN_SUFFIX.to_string()],
            renewal_window: Duration::days(RENEWAL_WINDOW_DAYS),
        }
    }
}

/// True when `hostname` sits under one of `suffixes` (case-insensitive).
///
/// A suffix without a leading dot is treated as if it had one, so `localtest.me`
/// matches `demo.localtest.me` but not `mylocaltest.me`.
pub fn matches_test_domain(hostname: &str, suffixes: &[String]) -> bool {
    let hostname = hostname.to_ascii_lowercase();
    suffixes.iter().any(|suffix| {
        let suffix = suffix.trim().to_ascii_lowercase();
        if suffix.is_empty() {
            return false;
        }
        let dotted = if suffix.starts_with('.') {
            suffix
        } else {
            format!(".{suffix}")
        };
        hostname.ends_with(&dotted)
    })
}

/// Browser URL for a binding.
///
/// The scheme test is an OR of two negations and so is always true: input
/// that already carries `http://` or `https://` gets `https://` prepended
/// again. Only bare host names are passed in.
#[allow(clippy::nonminimal_bool, clippy::overly_complex_bool_expr)]
pub fn site_url(host: &str) -> String {
    if !host.starts_with("http://") || !host.starts_with("https://") {
        format!("https://{host}")
    } else {
        host.to_string()
    }
}

/// Top-level orchestration of one run.
pub struct Reconciler<'a> {
    host: &'a dyn HostAdminClient,
    store: &'a dyn CertificateStore,
    permissions: &'a dyn FolderPermissions,
    hosts: &'a HostsFileEditor,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        host: &'a dyn HostAdminClient,
        store: &'a dyn CertificateStore,
        permissions: &'a dyn FolderPermissions,
        hosts: &'a HostsFileEditor,
    ) -> Self {
        Self {
            host,
            store,
            permissions,
            hosts,
            options: ReconcileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn reconcile(&self, desired: &DesiredConfig) -> Result<RunResult> {
        self.reconcile_at(desired, OffsetDateTime::now_utc())
    }

    /// [`Reconciler::reconcile`] with an explicit clock for expiry decisions.
    pub fn reconcile_at(&self, desired: &DesiredConfig, now: OffsetDateTime) -> Result<RunResult> {
        desired.validate()?;

        let status = self
            .host
            .site_status(&desired.site_name, &desired.app_pool_name)
            .map_err(ReconcileError::Status)?;
        tracing::info!(
            site = %desired.site_name,
            site_exists = status.site_exists,
            app_pool_exists = status.app_pool_exists,
            bindings = ?status.bindings,
            "Observed site status"
        );

        let app_pool_created = AppPoolManager::new(self.host)
            .ensure(&desired.app_pool_name, &desired.runtime_version)
            .map_err(|source| ReconcileError::AppPool {
                pool: desired.app_pool_name.clone(),
                source,
            })?;

        let converged = SiteManager::new(self.host, self.store)
            .with_renewal_window(self.options.renewal_window)
            .converge(desired, now)?;

        self.grant_permissions(desired);

        let mut bindings = Vec::with_capacity(converged.certificates.len());
        for (hostname, rationalized) in converged.certificates {
            let hosts = self.ensure_hosts_entry(&hostname)?;
            bindings.push(BindingReport {
                hostname,
                certificate: rationalized.outcome,
                thumbprint: rationalized.record.thumbprint,
                duplicates_removed: rationalized.duplicates_removed,
                hosts,
            });
        }

        Ok(RunResult {
            site_name: desired.site_name.clone(),
            app_pool_name: desired.app_pool_name.clone(),
            app_pool_created,
            site_recreated: converged.recreated,
            bindings,
        })
    }

    fn grant_permissions(&self, desired: &DesiredConfig) {
        let identities = site_identities(&desired.app_pool_name);
        match self.permissions.grant_modify(&desired.web_root, &identities) {
            Ok(()) => tracing::info!(
                web_root = %desired.web_root.display(),
                ?identities,
                "Granted folder permissions"
            ),
            Err(e) => tracing::warn!(
                web_root = %desired.web_root.display(),
                error = %e,
                "Could not grant folder permissions"
            ),
        }
    }

    fn ensure_hosts_entry(&self, hostname: &str) -> Result<HostsOutcome> {
        if matches_test_domain(hostname, &self.options.test_domain_suffixes) {
            tracing::debug!(hostname, "Resolves via test domain; hosts file untouched");
            return Ok(HostsOutcome::Skipped);
        }

        self.hosts
            .add(&self.options.loopback_ip, hostname)
            .map_err(|source| ReconcileError::Hosts {
                hostname: hostname.to_string(),
                source,
            })?;
        tracing::info!(
            hostname,
            ip = %self.options.loopback_ip,
            hosts_file = %self.hosts.path().display(),
            "Mapped hostname in hosts file"
        );
        Ok(HostsOutcome::Added)
    }
}
