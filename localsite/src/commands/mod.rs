pub mod apply;
pub mod status;

use std::path::PathBuf;

use time::Duration;

use crate::acl::{FolderPermissions, IcaclsPermissions};
use crate::certs::{CertificateStore, DEFAULT_VALIDITY_DAYS, PemDirStore, PowerShellCertStore};
use crate::cli::TargetArgs;
use crate::config::{Backend, ConfigError, Settings};
use crate::exec::SystemRunner;
use crate::host::{AppCmdClient, HostAdminClient, StateFileHost};
use crate::hosts::{HostsFileEditor, LOOPBACK_IP, default_hosts_path};
use crate::paths;
use crate::provision::ReconcileOptions;

/// Settings merged with command-line overrides for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub home: PathBuf,
    pub backend: Backend,
    pub hosts_path: PathBuf,
    pub cert_validity_days: i64,
    pub options: ReconcileOptions,
}

impl Context {
    pub fn resolve(target: &TargetArgs) -> Result<Self, ConfigError> {
        let home = paths::localsite_home_dir().map_err(|e| {
            ConfigError::Validation(format!("Could not determine localsite home directory: {}", e))
        })?;
        let settings = Settings::load_from_home(&home)?;
        Ok(Self::merge(home, settings, target))
    }

    fn merge(home: PathBuf, settings: Settings, target: &TargetArgs) -> Self {
        let mut options = ReconcileOptions::default();
        if let Some(ip) = settings.loopback_ip {
            options.loopback_ip = ip;
        }
        if let Some(suffixes) = settings.test_domain_suffixes {
            options.test_domain_suffixes = suffixes;
        }
        if let Some(days) = settings.renewal_window_days {
            options.renewal_window = Duration::days(days);
        }

        Self {
            backend: target
                .backend
                .or(settings.backend)
                .unwrap_or_else(Backend::platform_default),
            hosts_path: target
                .hosts_file
                .clone()
                .or(settings.hosts_file)
                .unwrap_or_else(default_hosts_path),
            cert_validity_days: settings.cert_validity_days.unwrap_or(DEFAULT_VALIDITY_DAYS),
            options,
            home,
        }
    }

    pub fn backends(&self) -> Backends {
        match self.backend {
            Backend::Iis => Backends {
                host: Box::new(AppCmdClient::new(SystemRunner)),
                store: Box::new(
                    PowerShellCertStore::new(SystemRunner)
                        .with_validity_days(self.cert_validity_days),
                ),
                permissions: Box::new(IcaclsPermissions::new(SystemRunner)),
            },
            Backend::Local => {
                let state = paths::host_state_file(&self.home);
                Backends {
                    host: Box::new(StateFileHost::new(&state)),
                    store: Box::new(
                        PemDirStore::new(paths::cert_store_dir(&self.home))
                            .with_validity_days(self.cert_validity_days),
                    ),
                    permissions: Box::new(StateFileHost::new(state)),
                }
            }
        }
    }

    pub fn hosts_editor(&self) -> HostsFileEditor {
        HostsFileEditor::new(&self.hosts_path)
    }
}

/// The injected collaborators for one backend.
pub struct Backends {
    pub host: Box<dyn HostAdminClient>,
    pub store: Box<dyn CertificateStore>,
    pub permissions: Box<dyn FolderPermissions>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn target(args: &[&str]) -> TargetArgs {
        let mut argv = vec!["localsite", "status"];
        argv.extend_from_slice(args);
        match crate::cli::Cli::try_parse_from(argv).unwrap().command {
            Some(crate::cli::Commands::Status { target }) => target,
            _ => panic!("expected Status"),
        }
    }

    #[test]
    fn defaults_without_settings_or_flags() {
        let ctx = Context::merge(
            PathBuf::from("/home/me/.localsite"),
            Settings::default(),
            &target(&["--hosts-file", "/tmp/hosts"]),
        );
        assert_eq!(ctx.backend, Backend::platform_default());
        assert_eq!(ctx.cert_validity_days, DEFAULT_VALIDITY_DAYS);
        assert_eq!(ctx.options, ReconcileOptions::default());
        assert_eq!(ctx.options.loopback_ip, LOOPBACK_IP);
    }

    #[test]
    fn flags_override_settings() {
        let settings = Settings {
            backend: Some(Backend::Iis),
            hosts_file: Some(PathBuf::from("/from/settings")),
            loopback_ip: Some("127.0.0.2".to_string()),
            test_domain_suffixes: Some(vec![".lvh.me".to_string()]),
            cert_validity_days: Some(90),
            renewal_window_days: Some(10),
        };
        let ctx = Context::merge(
            PathBuf::from("/h"),
            settings,
            &target(&["--backend", "local", "--hosts-file", "/from/flag"]),
        );

        assert_eq!(ctx.backend, Backend::Local);
        assert_eq!(ctx.hosts_path, PathBuf::from("/from/flag"));
        assert_eq!(ctx.cert_validity_days, 90);
        assert_eq!(ctx.options.loopback_ip, "127.0.0.2");
        assert_eq!(ctx.options.test_domain_suffixes, vec![".lvh.me"]);
        assert_eq!(ctx.options.renewal_window, Duration::days(10));
    }

    #[test]
    fn settings_fill_in_missing_flags() {
        let settings = Settings {
            hosts_file: Some(PathBuf::from("/from/settings")),
            ..Settings::default()
        };
        let mut args = target(&[]);
        args.hosts_file = None;
        let ctx = Context::merge(PathBuf::from("/h"), settings, &args);
        assert_eq!(ctx.hosts_path, PathBuf::from("/from/settings"));
    }
}
