//! JSON-persisted web host
//!
//! Keeps app pools, sites, bindings, certificate attachments and folder
//! grants in a single `host-state.json`. Every mutating call loads the file,
//! applies the change and writes it back atomically, so the file always
//! reflects the last completed operation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use localsite_core::{Binding, Protocol, SslFlags, Thumbprint};
use serde::{Deserialize, Serialize};

use super::{HostAdminClient, HostApiError, Result};
use crate::acl::{AclError, FolderPermissions};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPoolState {
    pub runtime_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteBindingState {
    #[serde(flatten)]
    pub binding: Binding,
    #[serde(default)]
    pub ssl_flags: SslFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Thumbprint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteState {
    pub app_pool: String,
    pub physical_path: PathBuf,
    #[serde(default)]
    pub bindings: Vec<SiteBindingState>,
}

impl SiteState {
    fn binding_mut(&mut self, binding: &Binding) -> Option<&mut SiteBindingState> {
        self.bindings.iter_mut().find(|b| &b.binding == binding)
    }
}

/// Whole host configuration as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostState {
    #[serde(default)]
    pub app_pools: BTreeMap<String, AppPoolState>,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteState>,
    /// Folder path -> identities granted modify access.
    #[serde(default)]
    pub folder_grants: BTreeMap<PathBuf, BTreeSet<String>>,
}

impl HostState {
    pub fn app_pool_exists(&self, name: &str) -> bool {
        self.app_pools.contains_key(name)
    }

    pub fn create_app_pool(&mut self, name: &str, runtime_version: &str) -> Result<()> {
        if self.app_pools.contains_key(name) {
            return Err(HostApiError::AppPoolExists(name.to_string()));
        }
        self.app_pools.insert(
            name.to_string(),
            AppPoolState {
                runtime_version: runtime_version.to_string(),
            },
        );
        Ok(())
    }

    pub fn site_bindings(&self, site: &str) -> Option<Vec<Binding>> {
        self.sites
            .get(site)
            .map(|s| s.bindings.iter().map(|b| b.binding.clone()).collect())
    }

    pub fn delete_site(&mut self, site: &str) -> Result<()> {
        self.sites
            .remove(site)
            .map(|_| ())
            .ok_or_else(|| HostApiError::SiteNotFound(site.to_string()))
    }

    pub fn create_site(
        &mut self,
        site: &str,
        binding: &Binding,
        physical_path: &Path,
        app_pool: &str,
    ) -> Result<()> {
        if self.sites.contains_key(site) {
            return Err(HostApiError::SiteExists(site.to_string()));
        }
        if !self.app_pools.contains_key(app_pool) {
            return Err(HostApiError::AppPoolNotFound(app_pool.to_string()));
        }
        self.sites.insert(
            site.to_string(),
            SiteState {
                app_pool: app_pool.to_string(),
                physical_path: physical_path.to_path_buf(),
                bindings: vec![SiteBindingState {
                    binding: binding.clone(),
                    ssl_flags: SslFlags::None,
                    certificate: None,
                }],
            },
        );
        Ok(())
    }

    pub fn add_binding(&mut self, site: &str, binding: &Binding, ssl_flags: SslFlags) -> Result<()> {
        let state = self
            .sites
            .get_mut(site)
            .ok_or_else(|| HostApiError::SiteNotFound(site.to_string()))?;
        if state.binding_mut(binding).is_some() {
            return Err(HostApiError::DuplicateBinding {
                site: site.to_string(),
                binding: binding.to_string(),
            });
        }
        state.bindings.push(SiteBindingState {
            binding: binding.clone(),
            ssl_flags,
            certificate: None,
        });
        Ok(())
    }

    pub fn attach_certificate(
        &mut self,
        site: &str,
        binding: &Binding,
        thumbprint: &Thumbprint,
    ) -> Result<()> {
        let state = self
            .sites
            .get_mut(site)
            .ok_or_else(|| HostApiError::SiteNotFound(site.to_string()))?;
        let not_found = || HostApiError::BindingNotFound {
            site: site.to_string(),
            binding: binding.to_string(),
        };
        if binding.protocol != Protocol::Https {
            return Err(not_found());
        }
        let entry = state.binding_mut(binding).ok_or_else(not_found)?;
        entry.certificate = Some(thumbprint.clone());
        Ok(())
    }

    pub fn grant(&mut self, root: &Path, identities: &[String]) {
        self.folder_grants
            .entry(root.to_path_buf())
            .or_default()
            .extend(identities.iter().cloned());
    }
}

pub struct StateFileHost {
    path: PathBuf,
}

impl StateFileHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state; a missing file is an empty host.
    pub fn load(&self) -> Result<HostState> {
        if !self.path.exists() {
            return Ok(HostState::default());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| HostApiError::StateRead(self.path.clone(), e))?;
        if content.trim().is_empty() {
            return Ok(HostState::default());
        }
        serde_json::from_str(&content).map_err(|e| HostApiError::StateParse(self.path.clone(), e))
    }

    fn save(&self, state: &HostState) -> Result<()> {
        let write_err = |e| HostApiError::StateWrite(self.path.clone(), e);

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| HostApiError::StateParse(self.path.clone(), e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut HostState) -> Result<T>) -> Result<T> {
        let mut state = self.load()?;
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }
}

impl HostAdminClient for StateFileHost {
    fn app_pool_exists(&self, name: &str) -> Result<bool> {
        Ok(self.load()?.app_pool_exists(name))
    }

    fn create_app_pool(&self, name: &str, runtime_version: &str) -> Result<()> {
        self.update(|s| s.create_app_pool(name, runtime_version))
    }

    fn site_bindings(&self, site: &str) -> Result<Option<Vec<Binding>>> {
        Ok(self.load()?.site_bindings(site))
    }

    fn delete_site(&self, site: &str) -> Result<()> {
        self.update(|s| s.delete_site(site))
    }

    fn create_site(
        &self,
        site: &str,
        binding: &Binding,
        physical_path: &Path,
        app_pool: &str,
    ) -> Result<()> {
        self.update(|s| s.create_site(site, binding, physical_path, app_pool))
    }

    fn add_binding(&self, site: &str, binding: &Binding, ssl_flags: SslFlags) -> Result<()> {
        self.update(|s| s.add_binding(site, binding, ssl_flags))
    }

    fn attach_certificate(
        &self,
        site: &str,
        binding: &Binding,
        thumbprint: &Thumbprint,
    ) -> Result<()> {
        self.update(|s| s.attach_certificate(site, binding, thumbprint))
    }
}

impl FolderPermissions for StateFileHost {
    fn grant_modify(&self, root: &Path, identities: &[String]) -> std::result::Result<(), AclError> {
        self.update(|s| {
            s.grant(root, identities);
            Ok(())
        })
        .map_err(|e| AclError::Backend(e.to_string()))
    }
}
