//! Desired and observed state for one local site.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const HTTP_PORT: u16 = 80;
pub const HTTPS_PORT: u16 = 443;

/// Longest hostname a DNS resolver accepts.
const MAX_HOSTNAME_LEN: usize = 253;

/// Reasons a [`DesiredConfig`] cannot be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DesiredConfigError {
    #[error("site name must not be empty")]
    EmptySiteName,

    #[error("app pool name must not be empty")]
    EmptyAppPoolName,

    #[error("at least one binding is required")]
    NoBindings,

    #[error("invalid binding '{binding}': {reason}")]
    InvalidBinding { binding: String, reason: String },

    #[error("binding '{0}' is listed more than once")]
    DuplicateBinding(String),
}

/// Everything one run converges the host towards.
///
/// Passed by reference through every component; nothing reads site or app
/// pool settings from anywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredConfig {
    pub site_name: String,
    pub app_pool_name: String,
    pub runtime_version: String,
    /// Host headers in the order they are bound. The first one creates the site.
    pub bindings: Vec<String>,
    pub web_root: PathBuf,
}

impl DesiredConfig {
    pub fn validate(&self) -> Result<(), DesiredConfigError> {
        if self.site_name.trim().is_empty() {
            return Err(DesiredConfigError::EmptySiteName);
        }
        if self.app_pool_name.trim().is_empty() {
            return Err(DesiredConfigError::EmptyAppPoolName);
        }
        if self.bindings.is_empty() {
            return Err(DesiredConfigError::NoBindings);
        }

        let mut seen = HashSet::new();
        for binding in &self.bindings {
            validate_hostname(binding).map_err(|reason| DesiredConfigError::InvalidBinding {
                binding: binding.clone(),
                reason,
            })?;
            if !seen.insert(binding.to_ascii_lowercase()) {
                return Err(DesiredConfigError::DuplicateBinding(binding.clone()));
            }
        }

        Ok(())
    }

    /// The binding the site is created with.
    pub fn primary_binding(&self) -> Option<&str> {
        self.bindings.first().map(String::as_str)
    }
}

fn validate_hostname(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("hostname is empty".to_string());
    }
    if name.len() > MAX_HOSTNAME_LEN {
        return Err(format!("longer than {MAX_HOSTNAME_LEN} characters"));
    }
    if !name.is_ascii() {
        return Err("hostname must be ASCII".to_string());
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err("hostname must not start or end with '.'".to_string());
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')))
    {
        return Err(format!("unexpected character {c:?}"));
    }
    Ok(())
}

/// Observed host state, recomputed at the start of every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatus {
    pub site_exists: bool,
    pub app_pool_exists: bool,
    /// Host headers currently bound to the site; `None` when the site is absent.
    pub bindings: Option<BTreeSet<String>>,
}

impl SiteStatus {
    pub fn absent(app_pool_exists: bool) -> Self {
        Self {
            site_exists: false,
            app_pool_exists,
            bindings: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// A (protocol, port, host-header) route onto a site.
///
/// Displays in the `protocol/*:port:host` notation used by the host's admin
/// tooling, e.g. `https/*:443:demo.example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub protocol: Protocol,
    pub port: u16,
    pub host_header: String,
}

impl Binding {
    pub fn http(host_header: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Http,
            port: HTTP_PORT,
            host_header: host_header.into(),
        }
    }

    pub fn https(host_header: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Https,
            port: HTTPS_PORT,
            host_header: host_header.into(),
        }
    }

    /// `*:port:host`, the part after the protocol.
    pub fn binding_information(&self) -> String {
        format!("*:{}:{}", self.port, self.host_header)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.binding_information())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid binding notation '{0}'")]
pub struct BindingParseError(pub String);

impl FromStr for Binding {
    type Err = BindingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || BindingParseError(s.to_string());

        let (protocol, info) = s.split_once('/').ok_or_else(err)?;
        let protocol = match protocol {
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            _ => return Err(err()),
        };

        // ip:port:host - the host may be empty for catch-all bindings
        let mut parts = info.splitn(3, ':');
        let _ip = parts.next().ok_or_else(err)?;
        let port = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(err)?;
        let host_header = parts.next().ok_or_else(err)?.to_string();

        Ok(Self {
            protocol,
            port,
            host_header,
        })
    }
}

/// SSL flags attached to an HTTPS binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslFlags {
    /// Certificate selected by IP:port.
    #[default]
    None,
    /// Certificate selected by host header (SNI).
    Sni,
}

impl SslFlags {
    pub fn bits(self) -> u32 {
        match self {
            SslFlags::None => 0,
            SslFlags::Sni => 1,
        }
    }
}

/// Unique identifier of a stored certificate: uppercase hex without separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thumbprint(String);

impl Thumbprint {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(
            raw.as_ref()
                .chars()
                .filter(|c| c.is_ascii_hexdigit())
                .map(|c| c.to_ascii_uppercase())
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreLocation {
    Personal,
    Trust,
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Personal => f.write_str("personal"),
            StoreLocation::Trust => f.write_str("trust"),
        }
    }
}

/// One certificate as seen in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    /// Subject common name; equals the hostname it was issued for.
    pub subject_name: String,
    pub thumbprint: Thumbprint,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    pub store_location: StoreLocation,
}

impl CertificateRecord {
    /// True when the certificate expires on or before `now + window`.
    pub fn expires_within(&self, now: OffsetDateTime, window: Duration) -> bool {
        self.not_after <= now + window
    }

    /// Whole days until expiry; negative once expired.
    pub fn days_until_expiry(&self, now: OffsetDateTime) -> i64 {
        (self.not_after - now).whole_days()
    }
}

/// One `ip hostname` mapping in the hosts file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsEntry {
    pub ip: String,
    pub hostname: String,
}

impl HostsEntry {
    pub fn new(ip: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            hostname: hostname.into(),
        }
    }
}

impl fmt::Display for HostsEntry {
    /// The on-disk line, without a line terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t\t{}", self.ip, self.hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn desired(bindings: &[&str]) -> DesiredConfig {
        DesiredConfig {
            site_name: "demo".to_string(),
            app_pool_name: "demoPool".to_string(),
            runtime_version: "v4.0".to_string(),
            bindings: bindings.iter().map(|b| b.to_string()).collect(),
            web_root: PathBuf::from("/site"),
        }
    }

    #[test]
    fn validate_accepts_scenario_config() {
        let config = desired(&["demo.localtest.me", "demo.example.com"]);
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.primary_binding(), Some("demo.localtest.me"));
    }

    #[test]
    fn validate_rejects_empty_names_and_bindings() {
        let mut config = desired(&["a.test"]);
        config.site_name = "  ".to_string();
        assert_eq!(config.validate(), Err(DesiredConfigError::EmptySiteName));

        let mut config = desired(&["a.test"]);
        config.app_pool_name.clear();
        assert_eq!(config.validate(), Err(DesiredConfigError::EmptyAppPoolName));

        assert_eq!(desired(&[]).validate(), Err(DesiredConfigError::NoBindings));
    }

    #[test]
    fn validate_rejects_bad_hostnames() {
        for bad in ["", "has space.test", "tab\there", "bücher.test", ".lead", "trail."] {
            let err = desired(&[bad]).validate().unwrap_err();
            assert!(
                matches!(err, DesiredConfigError::InvalidBinding { .. }),
                "{bad:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn validate_rejects_duplicate_bindings_case_insensitively() {
        let err = desired(&["demo.test", "Demo.Test"]).validate().unwrap_err();
        assert_eq!(err, DesiredConfigError::DuplicateBinding("Demo.Test".to_string()));
    }

    #[test]
    fn binding_display_uses_admin_notation() {
        assert_eq!(Binding::http("demo.test").to_string(), "http/*:80:demo.test");
        assert_eq!(
            Binding::https("demo.test").to_string(),
            "https/*:443:demo.test"
        );
    }

    #[test]
    fn binding_parses_admin_notation() {
        let binding: Binding = "https/*:443:demo.example.com".parse().unwrap();
        assert_eq!(binding, Binding::https("demo.example.com"));

        let catch_all: Binding = "http/*:8080:".parse().unwrap();
        assert_eq!(catch_all.port, 8080);
        assert_eq!(catch_all.host_header, "");

        assert!("net.tcp/808:*".parse::<Binding>().is_err());
        assert!("http/*:eighty:x".parse::<Binding>().is_err());
    }

    #[test]
    fn thumbprint_normalizes_separators_and_case() {
        let t = Thumbprint::new("ab:cd ef01");
        assert_eq!(t.as_str(), "ABCDEF01");
    }

    #[test]
    fn expires_within_is_inclusive() {
        let record = CertificateRecord {
            subject_name: "demo.test".to_string(),
            thumbprint: Thumbprint::new("AA"),
            not_after: datetime!(2025-02-01 00:00 UTC),
            store_location: StoreLocation::Personal,
        };
        let now = datetime!(2025-01-02 00:00 UTC);
        assert!(record.expires_within(now, Duration::days(30)));
        assert!(!record.expires_within(now, Duration::days(29)));
        assert_eq!(record.days_until_expiry(now), 30);
    }

    #[test]
    fn hosts_entry_renders_disk_format() {
        assert_eq!(
            HostsEntry::new("127.0.0.1", "demo.example.com").to_string(),
            "127.0.0.1\t\tdemo.example.com"
        );
    }
}
