use localsite_core::{CertificateRecord, DesiredConfig, HostsEntry, SiteStatus};
use serde::Serialize;
use time::OffsetDateTime;

use super::{Backends, Context};
use crate::cli::TargetArgs;
use crate::config::load_desired_config;
use crate::hosts::HostsFileEditor;
use crate::output;
use crate::provision::{ReconcileOptions, matches_test_domain};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    site_name: String,
    app_pool_name: String,
    status: SiteStatus,
    bindings: Vec<BindingStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BindingStatus {
    hostname: String,
    bound: bool,
    /// Personal-store certificates for the hostname; more than one means a
    /// run is needed to deduplicate.
    certificates: Vec<CertificateRecord>,
    trusted: bool,
    test_domain: bool,
    hosts_entry: Option<HostsEntry>,
}

pub fn run(target: &TargetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::resolve(target)?;
    let desired = load_desired_config(&target.config)?;
    let report = collect(&desired, &ctx.backends(), &ctx.hosts_editor(), &ctx.options)?;

    if target.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, OffsetDateTime::now_utc());
    }
    Ok(())
}

fn collect(
    desired: &DesiredConfig,
    backends: &Backends,
    hosts: &HostsFileEditor,
    options: &ReconcileOptions,
) -> Result<StatusReport, Box<dyn std::error::Error>> {
    let status = backends
        .host
        .site_status(&desired.site_name, &desired.app_pool_name)?;

    let mut bindings = Vec::with_capacity(desired.bindings.len());
    for hostname in &desired.bindings {
        let certificates = backends.store.find_by_subject(hostname)?;
        let mut trusted = !certificates.is_empty();
        for record in &certificates {
            trusted &= backends.store.is_trusted(&record.thumbprint)?;
        }
        let test_domain = matches_test_domain(hostname, &options.test_domain_suffixes);
        let hosts_entry = if test_domain {
            None
        } else {
            hosts.mapping(hostname)?
        };

        bindings.push(BindingStatus {
            hostname: hostname.clone(),
            bound: status
                .bindings
                .as_ref()
                .is_some_and(|b| b.contains(hostname)),
            certificates,
            trusted,
            test_domain,
            hosts_entry,
        });
    }

    Ok(StatusReport {
        site_name: desired.site_name.clone(),
        app_pool_name: desired.app_pool_name.clone(),
        status,
        bindings,
    })
}

fn print_report(report: &StatusReport, now: OffsetDateTime) {
    let presence = |exists: bool| if exists { "present" } else { "missing" };
    output::field("Site", &format!("{} ({})", report.site_name, presence(report.status.site_exists)), 9);
    output::field(
        "App pool",
        &format!("{} ({})", report.app_pool_name, presence(report.status.app_pool_exists)),
        9,
    );

    for binding in &report.bindings {
        output::section(&binding.hostname);
        output::field("Binding", presence(binding.bound), 12);

        let certificate = match binding.certificates.as_slice() {
            [] => "none".to_string(),
            [record] => format!(
                "{} (expires in {} days{})",
                record.thumbprint,
                record.days_until_expiry(now),
                if binding.trusted { "" } else { ", not trusted" }
            ),
            many => format!("{} duplicates, run apply to clean up", many.len()),
        };
        output::field("Certificate", &certificate, 12);

        let hosts = match (&binding.hosts_entry, binding.test_domain) {
            (_, true) => "resolves via test domain".to_string(),
            (Some(entry), false) => entry.ip.clone(),
            (None, false) => "missing".to_string(),
        };
        output::field("Hosts", &hosts, 12);
    }

    if report.bindings.iter().any(|b| {
        b.certificates.len() != 1 || !b.bound || (!b.test_domain && b.hosts_entry.is_none())
    }) {
        output::warning("Site is not fully provisioned; run `localsite apply`");
    }
}
