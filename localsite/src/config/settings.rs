//! Tool settings (`localsite.toml` in the localsite home)
//!
//! Every field is optional; a missing file means all defaults. Command-line
//! flags override what is set here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::{ConfigError, Result};

pub const SETTINGS_FILE_NAME: &str = "localsite.toml";

/// Which pair of host + certificate store implementations to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// IIS through appcmd/netsh, Windows certificate stores through PowerShell
    Iis,
    /// JSON state file and PEM certificate directory under the localsite home
    Local,
}

impl Backend {
    pub fn platform_default() -> Self {
        if cfg!(windows) { Backend::Iis } else { Backend::Local }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Iis => f.write_str("iis"),
            Backend::Local => f.write_str("local"),
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iis" => Ok(Backend::Iis),
            "local" => Ok(Backend::Local),
            other => Err(ConfigError::Validation(format!(
                "unknown backend '{other}' (expected 'iis' or 'local')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub backend: Option<Backend>,

    #[serde(default)]
    pub hosts_file: Option<PathBuf>,

    #[serde(default)]
    pub loopback_ip: Option<String>,

    /// Wildcard domains that already resolve to loopback.
    #[serde(default)]
    pub test_domain_suffixes: Option<Vec<String>>,

    #[serde(default)]
    pub cert_validity_days: Option<i64>,

    #[serde(default)]
    pub renewal_window_days: Option<i64>,
}

impl Settings {
    pub fn path_in(home: &Path) -> PathBuf {
        home.join(SETTINGS_FILE_NAME)
    }

    /// Load `localsite.toml` from `home`, or defaults when it does not exist.
    pub fn load_from_home(home: &Path) -> Result<Self> {
        let path = Self::path_in(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(&path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(path.as_ref().to_path_buf(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if let Some(days) = self.cert_validity_days
            && days <= 0
        {
            return Err(ConfigError::Validation(format!(
                "cert_validity_days must be positive, got {days}"
            )));
        }
        if let Some(days) = self.renewal_window_days
            && days < 0
        {
            return Err(ConfigError::Validation(format!(
                "renewal_window_days must not be negative, got {days}"
            )));
        }
        if let (Some(validity), Some(window)) = (self.cert_validity_days, self.renewal_window_days)
            && window >= validity
        {
            return Err(ConfigError::Validation(format!(
                "renewal_window_days ({window}) must be shorter than cert_validity_days ({validity}); \
                 every new certificate would be renewed on the next run"
            )));
        }
        if let Some(ip) = &self.loopback_ip
            && ip.parse::<std::net::IpAddr>().is_err()
        {
            return Err(ConfigError::Validation(format!(
                "loopback_ip '{ip}' is not an IP address"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_or_missing_file_is_default() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());

        let temp = TempDir::new().unwrap();
        assert_eq!(
            Settings::load_from_home(temp.path()).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn parses_every_field() {
        let settings = Settings::parse(
            r#"
backend = "local"
hosts_file = "/tmp/hosts"
loopback_ip = "127.0.0.2"
test_domain_suffixes = [".localtest.me", ".lvh.me"]
cert_validity_days = 90
renewal_window_days = 14
"#,
        )
        .unwrap();

        assert_eq!(settings.backend, Some(Backend::Local));
        assert_eq!(settings.hosts_file, Some(PathBuf::from("/tmp/hosts")));
        assert_eq!(settings.loopback_ip.as_deref(), Some("127.0.0.2"));
        assert_eq!(settings.test_domain_suffixes.unwrap().len(), 2);
        assert_eq!(settings.cert_validity_days, Some(90));
        assert_eq!(settings.renewal_window_days, Some(14));
    }

    #[test]
    fn rejects_bad_values() {
        for bad in [
            "cert_validity_days = 0",
            "renewal_window_days = -1",
            "cert_validity_days = 30\nrenewal_window_days = 30",
            "loopback_ip = \"localhost\"",
        ] {
            assert!(
                matches!(Settings::parse(bad), Err(ConfigError::Validation(_))),
                "{bad:?} should fail validation"
            );
        }
        assert!(matches!(
            Settings::parse("backend = \"apache\""),
            Err(ConfigError::TomlParse(_))
        ));
        assert!(matches!(
            Settings::parse("unknown = 1"),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn backend_from_str() {
        assert_eq!("IIS".parse::<Backend>().unwrap(), Backend::Iis);
        assert_eq!(" local ".parse::<Backend>().unwrap(), Backend::Local);
        assert!("nginx".parse::<Backend>().is_err());
        assert_eq!(Backend::Local.to_string(), "local");
    }

    #[test]
    fn load_from_home_reads_file() {
        let temp = TempDir::new().unwrap();
        fs::write(Settings::path_in(temp.path()), "backend = \"iis\"\n").unwrap();
        assert_eq!(
            Settings::load_from_home(temp.path()).unwrap().backend,
            Some(Backend::Iis)
        );
    }
}
