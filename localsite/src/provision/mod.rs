//! Convergence engine
//!
//! [`Reconciler`] drives one [`localsite_core::DesiredConfig`] onto the host,
//! strictly in order: validate, observe, app pool, site + certificates,
//! folder permissions, hosts file. There is no rollback; a failed step leaves
//! what earlier steps did and the next run repairs it.

mod app_pool;
mod reconcile;
mod site;

use localsite_core::DesiredConfigError;
use thiserror::Error;

use crate::certs::CertError;
use crate::host::HostApiError;
use crate::hosts::HostsError;

pub use app_pool::AppPoolManager;
pub use reconcile::{ReconcileOptions, Reconciler, matches_test_domain, site_url};
pub use site::{SiteConvergence, SiteManager};

/// A failed run, naming the step that failed.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] DesiredConfigError),

    #[error("Reading site status failed: {0}")]
    Status(#[source] HostApiError),

    #[error("App pool '{pool}': {source}")]
    AppPool { pool: String, source: HostApiError },

    #[error("Site '{site}': {source}")]
    Site { site: String, source: HostApiError },

    #[error("Binding {binding}: {source}")]
    Binding { binding: String, source: HostApiError },

    #[error("Certificate for {hostname}: {source}")]
    Certificate { hostname: String, source: CertError },

    #[error("Hosts file entry for {hostname}: {source}")]
    Hosts { hostname: String, source: HostsError },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
