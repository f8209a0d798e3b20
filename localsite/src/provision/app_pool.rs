use crate::host::{HostAdminClient, HostApiError};

/// Creates the app pool when missing. An existing pool is never modified,
/// even when its runtime version differs.
pub struct AppPoolManager<'a> {
    host: &'a dyn HostAdminClient,
}

impl<'a> AppPoolManager<'a> {
    pub fn new(host: &'a dyn HostAdminClient) -> Self {
        Self { host }
    }

    /// Returns `true` when the pool was created by this call.
    pub fn ensure(&self, name: &str, runtime_version: &str) -> Result<bool, HostApiError> {
        if self.host.app_pool_exists(name)? {
            tracing::debug!(app_pool = name, "App pool already exists");
            return Ok(false);
        }

        self.host.create_app_pool(name, runtime_version)?;
        tracing::info!(app_pool = name, runtime_version, "Created app pool");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingHost;

    #[test]
    fn creates_missing_pool_once() {
        let host = RecordingHost::new();
        let manager = AppPoolManager::new(&host);

        assert!(manager.ensure("demoPool", "v4.0").unwrap());
        assert!(!manager.ensure("demoPool", "v4.0").unwrap());
        assert_eq!(host.calls(), vec!["create_app_pool demoPool v4.0"]);
    }

    #[test]
    fn existing_pool_keeps_its_runtime() {
        let host = RecordingHost::new();
        host.create_app_pool("demoPool", "v2.0").unwrap();
        let manager = AppPoolManager::new(&host);

        assert!(!manager.ensure("demoPool", "v4.0").unwrap());
        assert_eq!(
            host.state.borrow().app_pools["demoPool"].runtime_version,
            "v2.0"
        );
    }
}
