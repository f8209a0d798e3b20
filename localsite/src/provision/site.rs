//! Site convergence by delete-and-recreate
//!
//! An existing site is always deleted and rebuilt from the desired config, so
//! bindings, physical path and app pool never drift. HTTP bindings go on
//! first; each HTTPS binding follows its certificate.

use localsite_core::{Binding, DesiredConfig, SslFlags};
use time::{Duration, OffsetDateTime};

use super::{ReconcileError, Result};
use crate::certs::{CertificateRationalizer, CertificateStore, RENEWAL_WINDOW_DAYS, Rationalized};
use crate::host::HostAdminClient;

/// What converging the site did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConvergence {
    /// The site existed and was deleted before rebuilding.
    pub recreated: bool,
    /// One entry per configured binding, in config order.
    pub certificates: Vec<(String, Rationalized)>,
}

pub struct SiteManager<'a> {
    host: &'a dyn HostAdminClient,
    store: &'a dyn CertificateStore,
    renewal_window: Duration,
}

impl<'a> SiteManager<'a> {
    pub fn new(host: &'a dyn HostAdminClient, store: &'a dyn CertificateStore) -> Self {
        Self {
            host,
            store,
            renewal_window: Duration::days(RENEWAL_WINDOW_DAYS),
        }
    }

    pub fn with_renewal_window(mut self, window: Duration) -> Self {
        self.renewal_window = window;
        self
    }

    pub fn converge(&self, desired: &DesiredConfig, now: OffsetDateTime) -> Result<SiteConvergence> {
        let site = desired.site_name.as_str();
        let site_err = |source| ReconcileError::Site {
            site: site.to_string(),
            source,
        };

        let recreated = self.host.site_exists(site).map_err(site_err)?;
        if recreated {
            self.host.delete_site(site).map_err(site_err)?;
            tracing::info!(site, "Deleted existing site");
        }

        let mut hostnames = desired.bindings.iter();
        let Some(primary) = hostnames.next() else {
            return Err(localsite_core::DesiredConfigError::NoBindings.into());
        };

        self.host
            .create_site(
                site,
                &Binding::http(primary.as_str()),
                &desired.web_root,
                &desired.app_pool_name,
            )
            .map_err(site_err)?;
        tracing::info!(
            site,
            binding = %Binding::http(primary.as_str()),
            web_root = %desired.web_root.display(),
            app_pool = %desired.app_pool_name,
            "Created site"
        );

        for hostname in hostnames {
            self.add_binding(site, &Binding::http(hostname.as_str()), SslFlags::None)?;
        }

        let rationalizer =
            CertificateRationalizer::new(self.store).with_renewal_window(self.renewal_window);
        let mut certificates = Vec::with_capacity(desired.bindings.len());
        for hostname in &desired.bindings {
            let rationalized = rationalizer.rationalize(hostname, now).map_err(|source| {
                ReconcileError::Certificate {
                    hostname: hostname.clone(),
                    source,
                }
            })?;

            let https = Binding::https(hostname.as_str());
            self.add_binding(site, &https, SslFlags::Sni)?;
            self.host
                .attach_certificate(site, &https, &rationalized.record.thumbprint)
                .map_err(|source| ReconcileError::Binding {
                    binding: https.to_string(),
                    source,
                })?;
            tracing::info!(
                site,
                binding = %https,
                thumbprint = %rationalized.record.thumbprint,
                "Attached certificate"
            );

            certificates.push((hostname.clone(), rationalized));
        }

        Ok(SiteConvergence {
            recreated,
            certificates,
        })
    }

    fn add_binding(&self, site: &str, binding: &Binding, ssl_flags: SslFlags) -> Result<()> {
        self.host
            .add_binding(site, binding, ssl_flags)
            .map_err(|source| ReconcileError::Binding {
                binding: binding.to_string(),
                source,
            })?;
        tracing::info!(site, %binding, "Added binding");
        Ok(())
    }
}
