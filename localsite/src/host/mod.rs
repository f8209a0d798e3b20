//! Web host administration
//!
//! [`HostAdminClient`] is the seam over the web host's management API (sites,
//! app pools, bindings, certificate attachment). Backends:
//!
//! - **appcmd**: IIS via `appcmd.exe` and `netsh http`
//! - **state file**: portable JSON-persisted host used off Windows and in tests

mod appcmd;
mod state_file;

use std::path::{Path, PathBuf};

use localsite_core::{Binding, SiteStatus, SslFlags, Thumbprint};
use thiserror::Error;

pub use appcmd::AppCmdClient;
pub use state_file::StateFileHost;

#[derive(Debug, Error)]
pub enum HostApiError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    #[error("Site '{0}' already exists")]
    SiteExists(String),

    #[error("Site '{0}' not found")]
    SiteNotFound(String),

    #[error("App pool '{0}' already exists")]
    AppPoolExists(String),

    #[error("App pool '{0}' not found")]
    AppPoolNotFound(String),

    #[error("Binding {binding} already exists on site '{site}'")]
    DuplicateBinding { site: String, binding: String },

    #[error("Binding {binding} not found on site '{site}'")]
    BindingNotFound { site: String, binding: String },

    #[error("Failed to read state file {0}: {1}")]
    StateRead(PathBuf, std::io::Error),

    #[error("Failed to write state file {0}: {1}")]
    StateWrite(PathBuf, std::io::Error),

    #[error("Invalid state file {0}: {1}")]
    StateParse(PathBuf, serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HostApiError>;

/// Management operations on the local web host.
///
/// Every call is synchronous and takes effect before it returns.
pub trait HostAdminClient {
    fn app_pool_exists(&self, name: &str) -> Result<bool>;

    /// Create an app pool running `runtime_version` (e.g. `v4.0`).
    fn create_app_pool(&self, name: &str, runtime_version: &str) -> Result<()>;

    /// Bindings of `site`, or `None` when the site does not exist.
    fn site_bindings(&self, site: &str) -> Result<Option<Vec<Binding>>>;

    fn delete_site(&self, site: &str) -> Result<()>;

    /// Create `site` with a single initial `binding`, serving `physical_path`
    /// from `app_pool`.
    fn create_site(
        &self,
        site: &str,
        binding: &Binding,
        physical_path: &Path,
        app_pool: &str,
    ) -> Result<()>;

    fn add_binding(&self, site: &str, binding: &Binding, ssl_flags: SslFlags) -> Result<()>;

    /// Serve `binding` (an HTTPS binding) with the certificate `thumbprint`.
    fn attach_certificate(&self, site: &str, binding: &Binding, thumbprint: &Thumbprint)
    -> Result<()>;

    fn site_exists(&self, site: &str) -> Result<bool> {
        Ok(self.site_bindings(site)?.is_some())
    }

    fn site_status(&self, site: &str, app_pool: &str) -> Result<SiteStatus> {
        let app_pool_exists = self.app_pool_exists(app_pool)?;
        Ok(match self.site_bindings(site)? {
            None => SiteStatus::absent(app_pool_exists),
            Some(bindings) => SiteStatus {
                site_exists: true,
                app_pool_exists,
                bindings: Some(bindings.into_iter().map(|b| b.host_header).collect()),
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::state_file::HostState;
    use super::*;
    use std::cell::RefCell;

    /// In-memory host that records every mutating call in order.
    #[derive(Default)]
    pub struct RecordingHost {
        pub state: RefCell<HostState>,
        pub calls: RefCell<Vec<String>>,
    }

    impl RecordingHost {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl HostAdminClient for RecordingHost {
        fn app_pool_exists(&self, name: &str) -> Result<bool> {
            Ok(self.state.borrow().app_pool_exists(name))
        }

        fn create_app_pool(&self, name: &str, runtime_version: &str) -> Result<()> {
            self.record(format!("create_app_pool {name} {runtime_version}"));
            self.state.borrow_mut().create_app_pool(name, runtime_version)
        }

        fn site_bindings(&self, site: &str) -> Result<Option<Vec<Binding>>> {
            Ok(self.state.borrow().site_bindings(site))
        }

        fn delete_site(&self, site: &str) -> Result<()> {
            self.record(format!("delete_site {site}"));
            self.state.borrow_mut().delete_site(site)
        }

        fn create_site(
            &self,
            site: &str,
            binding: &Binding,
            physical_path: &Path,
            app_pool: &str,
        ) -> Result<()> {
            self.record(format!("create_site {site} {binding}"));
            self.state
                .borrow_mut()
                .create_site(site, binding, physical_path, app_pool)
        }

        fn add_binding(&self, site: &str, binding: &Binding, ssl_flags: SslFlags) -> Result<()> {
            self.record(format!("add_binding {site} {binding} ssl={}", ssl_flags.bits()));
            self.state.borrow_mut().add_binding(site, binding, ssl_flags)
        }

        fn attach_certificate(
            &self,
            site: &str,
            binding: &Binding,
            thumbprint: &Thumbprint,
        ) -> Result<()> {
            self.record(format!("attach_certificate {site} {binding} {thumbprint}"));
            self.state
                .borrow_mut()
                .attach_certificate(site, binding, thumbprint)
        }
    }
}
