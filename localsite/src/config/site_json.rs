//! Site definition file (`site.json`)
//!
//! ```json
//! {
//!   "IIS-Site-Name": "demo",
//!   "App-Pool-Name": "demoPool",
//!   "IIS-App-Pool-Dot-Net-Version": "v4.0",
//!   "bindings": ["demo.localtest.me", "demo.example.com"],
//!   "Web-Root": "public"
//! }
//! ```
//!
//! `Web-Root` is optional and defaults to the directory holding the file;
//! relative paths resolve against that directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use localsite_core::DesiredConfig;

use super::error::{ConfigError, Result};

pub const SITE_CONFIG_FILE_NAME: &str = "site.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteJson {
    #[serde(rename = "IIS-Site-Name", default)]
    pub site_name: Option<String>,

    #[serde(rename = "App-Pool-Name", default)]
    pub app_pool_name: Option<String>,

    #[serde(rename = "IIS-App-Pool-Dot-Net-Version", default)]
    pub runtime_version: Option<String>,

    #[serde(default)]
    pub bindings: Option<Vec<String>>,

    #[serde(rename = "Web-Root", default, skip_serializing_if = "Option::is_none")]
    pub web_root: Option<PathBuf>,
}

impl SiteJson {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(path.as_ref().to_path_buf(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Resolve into a validated [`DesiredConfig`]; `base_dir` anchors `Web-Root`.
    pub fn into_desired(self, base_dir: &Path) -> Result<DesiredConfig> {
        let site_name = self.site_name.ok_or(ConfigError::MissingKey("IIS-Site-Name"))?;
        let app_pool_name = self
            .app_pool_name
            .ok_or(ConfigError::MissingKey("App-Pool-Name"))?;
        let runtime_version = self
            .runtime_version
            .ok_or(ConfigError::MissingKey("IIS-App-Pool-Dot-Net-Version"))?;
        let bindings = self.bindings.ok_or(ConfigError::MissingKey("bindings"))?;

        let web_root = match self.web_root {
            Some(root) if root.is_absolute() => root,
            Some(root) => base_dir.join(root),
            None => base_dir.to_path_buf(),
        };

        let desired = DesiredConfig {
            site_name: site_name.trim().to_string(),
            app_pool_name: app_pool_name.trim().to_string(),
            runtime_version: runtime_version.trim().to_string(),
            bindings: bindings.into_iter().map(|b| b.trim().to_string()).collect(),
            web_root,
        };
        desired.validate()?;
        Ok(desired)
    }
}

/// Load `path` and resolve it against its own directory.
pub fn load_desired_config(path: &Path) -> Result<DesiredConfig> {
    let site = SiteJson::load_from_file(path)?;
    let path = std::path::absolute(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    site.into_desired(&base_dir)
}
