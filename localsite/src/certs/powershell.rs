//! Windows machine certificate store driven through PowerShell
//!
//! Personal is `Cert:\LocalMachine\My`, trust is `Cert:\LocalMachine\Root`.
//! Every query pipes `Thumbprint`, `Subject` and a UTC round-trip `NotAfter`
//! through `ConvertTo-Json` so the output parses the same on every
//! PowerShell version.

use localsite_core::{CertificateRecord, StoreLocation, Thumbprint};
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::store::{CertError, CertificateStore, DEFAULT_VALIDITY_DAYS, Result};
use crate::exec::{CommandOutput, CommandRunner};

const POWERSHELL: &str = "powershell.exe";
const PERSONAL_PATH: &str = r"Cert:\LocalMachine\My";
const TRUST_PATH: &str = r"Cert:\LocalMachine\Root";

/// Exit code the scripts use for "no such certificate"
const EXIT_NOT_FOUND: i32 = 3;

const SELECT_RECORD: &str = "Select-Object Thumbprint, Subject, \
@{n='NotAfter';e={$_.NotAfter.ToUniversalTime().ToString('o')}}";

#[derive(Debug, Deserialize)]
struct PsCertificate {
    #[serde(rename = "Thumbprint")]
    thumbprint: String,
    #[serde(rename = "Subject")]
    subject: String,
    #[serde(rename = "NotAfter")]
    not_after: String,
}

/// Single quotes are the only thing to escape inside a PowerShell '...' literal.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn store_path(location: StoreLocation) -> &'static str {
    match location {
        StoreLocation::Personal => PERSONAL_PATH,
        StoreLocation::Trust => TRUST_PATH,
    }
}

/// Wrap a pipeline so the output is always a JSON array, even for 0 or 1 items.
fn as_json_array(pipeline: &str) -> String {
    format!("ConvertTo-Json -Compress -InputObject @({pipeline} | {SELECT_RECORD})")
}

fn parse_records(stdout: &str, location: StoreLocation) -> Result<Vec<CertificateRecord>> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value =
        serde_json::from_str(stdout).map_err(|e| CertError::Parse(e.to_string()))?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        single => vec![single],
    };

    items
        .into_iter()
        .map(|item| {
            let cert: PsCertificate =
                serde_json::from_value(item).map_err(|e| CertError::Parse(e.to_string()))?;
            to_record(cert, location)
        })
        .collect()
}

fn to_record(cert: PsCertificate, location: StoreLocation) -> Result<CertificateRecord> {
    let subject_name = cert
        .subject
        .split(',')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("CN="))
        .ok_or_else(|| CertError::Parse(format!("no CN in subject '{}'", cert.subject)))?
        .to_string();
    let not_after = OffsetDateTime::parse(&cert.not_after, &Rfc3339)
        .map_err(|e| CertError::Parse(format!("NotAfter '{}': {}", cert.not_after, e)))?;

    Ok(CertificateRecord {
        subject_name,
        thumbprint: Thumbprint::new(cert.thumbprint),
        not_after,
        store_location: location,
    })
}

pub struct PowerShellCertStore<R> {
    runner: R,
    validity_days: i64,
}

impl<R: CommandRunner> PowerShellCertStore<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }

    pub fn with_validity_days(mut self, days: i64) -> Self {
        self.validity_days = days;
        self
    }

    fn run(&self, script: &str) -> Result<CommandOutput> {
        let args = [
            "-NoProfile",
            "-NonInteractive",
            "-ExecutionPolicy",
            "Bypass",
            "-Command",
            script,
        ]
        .map(String::from);

        self.runner
            .run(POWERSHELL, &args)
            .map_err(|e| CertError::Command(format!("Failed to start {POWERSHELL}: {e}")))
    }

    fn run_ok(&self, script: &str) -> Result<CommandOutput> {
        let out = self.run(script)?;
        if !out.success() {
            return Err(CertError::Command(out.failure_message()));
        }
        Ok(out)
    }
}

impl<R: CommandRunner> CertificateStore for PowerShellCertStore<R> {
    fn find_by_subject(&self, cn: &str) -> Result<Vec<CertificateRecord>> {
        let subject = quote(&format!("CN={cn}"));
        let script = as_json_array(&format!(
            "Get-ChildItem -Path {} | Where-Object {{ $_.Subject -eq {subject} }}",
            quote(PERSONAL_PATH)
        ));
        let out = self.run_ok(&script)?;
        parse_records(&out.stdout, StoreLocation::Personal)
    }

    fn create(&self, cn: &str) -> Result<CertificateRecord> {
        let script = as_json_array(&format!(
            "New-SelfSignedCertificate -DnsName {name} -Subject {subject} \
-CertStoreLocation {store} -NotAfter (Get-Date).AddDays({days})",
            name = quote(cn),
            subject = quote(&format!("CN={cn}")),
            store = quote(PERSONAL_PATH),
            days = self.validity_days,
        ));
        let out = self.run_ok(&script)?;
        parse_records(&out.stdout, StoreLocation::Personal)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CertError::Generation("New-SelfSignedCertificate returned nothing".to_string())
            })
    }

    fn delete(&self, record: &CertificateRecord) -> Result<()> {
        let path = quote(&format!(
            r"{}\{}",
            store_path(record.store_location),
            record.thumbprint
        ));
        let script = format!(
            "if (Test-Path -Path {path}) {{ Remove-Item -Path {path} }} else {{ exit {EXIT_NOT_FOUND} }}"
        );

        let out = self.run(&script)?;
        match out.code {
            Some(0) => Ok(()),
            Some(EXIT_NOT_FOUND) => Err(CertError::NotFound(record.thumbprint.clone())),
            _ => Err(CertError::Command(out.failure_message())),
        }
    }

    fn install_to_trust(&self, record: &CertificateRecord) -> Result<()> {
        let source = quote(&format!(r"{PERSONAL_PATH}\{}", record.thumbprint));
        let target = quote(&format!(r"{TRUST_PATH}\{}", record.thumbprint));
        let script = format!(
            "if (Test-Path -Path {target}) {{ exit 0 }}; \
$cert = Get-Item -Path {source} -ErrorAction SilentlyContinue; \
if (-not $cert) {{ exit {EXIT_NOT_FOUND} }}; \
$store = New-Object System.Security.Cryptography.X509Certificates.X509Store('Root', 'LocalMachine'); \
$store.Open('ReadWrite'); $store.Add($cert); $store.Close()"
        );

        let out = self.run(&script)?;
        match out.code {
            Some(0) => Ok(()),
            Some(EXIT_NOT_FOUND) => Err(CertError::NotFound(record.thumbprint.clone())),
            _ => Err(CertError::Command(out.failure_message())),
        }
    }

    fn find_in_trust(&self, thumbprint: &Thumbprint) -> Result<Option<CertificateRecord>> {
        let script = as_json_array(&format!(
            "Get-ChildItem -Path {} -ErrorAction SilentlyContinue",
            quote(&format!(r"{TRUST_PATH}\{thumbprint}"))
        ));
        let out = self.run_ok(&script)?;
        Ok(parse_records(&out.stdout, StoreLocation::Trust)?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use time::macros::datetime;

    const TWO_CERTS: &str = r#"[{"Thumbprint":"0A1B2C","Subject":"CN=demo.example.com","NotAfter":"2026-06-01T00:00:00.0000000Z"},{"Thumbprint":"3d4e5f","Subject":"CN=demo.example.com, O=Acme","NotAfter":"2025-01-01T12:30:00.0000000Z"}]"#;

    fn record(thumbprint: &str, location: StoreLocation) -> CertificateRecord {
        CertificateRecord {
            subject_name: "demo.example.com".to_string(),
            thumbprint: Thumbprint::new(thumbprint),
            not_after: datetime!(2026-06-01 00:00 UTC),
            store_location: location,
        }
    }

    #[test]
    fn parses_array_output() {
        let records = parse_records(TWO_CERTS, StoreLocation::Personal).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].thumbprint.as_str(), "0A1B2C");
        assert_eq!(records[0].not_after, datetime!(2026-06-01 00:00 UTC));
        assert_eq!(records[1].thumbprint.as_str(), "3D4E5F");
        assert_eq!(records[1].subject_name, "demo.example.com");
        assert_eq!(records[1].not_after, datetime!(2025-01-01 12:30 UTC));
    }

    #[test]
    fn parses_single_object_and_empty_output() {
        let single = r#"{"Thumbprint":"AA","Subject":"CN=a.test","NotAfter":"2026-01-01T00:00:00Z"}"#;
        assert_eq!(parse_records(single, StoreLocation::Trust).unwrap().len(), 1);
        assert!(parse_records("", StoreLocation::Trust).unwrap().is_empty());
        assert!(parse_records("[]\r\n", StoreLocation::Trust).unwrap().is_empty());
    }

    #[test]
    fn rejects_subject_without_cn() {
        let bad = r#"[{"Thumbprint":"AA","Subject":"O=Acme","NotAfter":"2026-01-01T00:00:00Z"}]"#;
        assert!(matches!(
            parse_records(bad, StoreLocation::Personal),
            Err(CertError::Parse(_))
        ));
    }

    #[test]
    fn find_by_subject_filters_on_exact_cn() {
        let runner = ScriptedRunner::new().reply(0, TWO_CERTS);
        let store = PowerShellCertStore::new(runner);

        let found = store.find_by_subject("demo.example.com").unwrap();
        assert_eq!(found.len(), 2);

        let (program, args) = store.runner.call(0);
        assert_eq!(program, "powershell.exe");
        let script = args.last().unwrap();
        assert!(script.contains(r"Get-ChildItem -Path 'Cert:\LocalMachine\My'"));
        assert!(script.contains("$_.Subject -eq 'CN=demo.example.com'"));
        assert!(script.starts_with("ConvertTo-Json -Compress -InputObject @("));
    }

    #[test]
    fn create_requests_configured_validity() {
        let created = r#"[{"Thumbprint":"FF00","Subject":"CN=demo.test","NotAfter":"2026-10-18T00:00:00.0000000Z"}]"#;
        let store = PowerShellCertStore::new(ScriptedRunner::new().reply(0, created))
            .with_validity_days(90);

        let record = store.create("demo.test").unwrap();
        assert_eq!(record.thumbprint.as_str(), "FF00");

        let (_, args) = store.runner.call(0);
        let script = args.last().unwrap();
        assert!(script.contains("New-SelfSignedCertificate -DnsName 'demo.test'"));
        assert!(script.contains("(Get-Date).AddDays(90)"));
    }

    #[test]
    fn delete_maps_exit_code_to_not_found() {
        let store = PowerShellCertStore::new(ScriptedRunner::new().reply(EXIT_NOT_FOUND, ""));
        let err = store
            .delete(&record("ABCD", StoreLocation::Trust))
            .unwrap_err();
        assert!(matches!(err, CertError::NotFound(_)));

        let (_, args) = store.runner.call(0);
        assert!(args.last().unwrap().contains(r"'Cert:\LocalMachine\Root\ABCD'"));
    }

    #[test]
    fn install_to_trust_targets_root_store() {
        let store = PowerShellCertStore::new(ScriptedRunner::new());
        store
            .install_to_trust(&record("ABCD", StoreLocation::Personal))
            .unwrap();

        let (_, args) = store.runner.call(0);
        let script = args.last().unwrap();
        assert!(script.contains(r"Test-Path -Path 'Cert:\LocalMachine\Root\ABCD'"));
        assert!(script.contains(r"Get-Item -Path 'Cert:\LocalMachine\My\ABCD'"));
        assert!(script.contains("X509Store('Root', 'LocalMachine')"));
    }

    #[test]
    fn empty_trust_lookup_is_none() {
        let store = PowerShellCertStore::new(ScriptedRunner::new().reply(0, "[]"));
        assert!(store.find_in_trust(&Thumbprint::new("AB")).unwrap().is_none());
        assert_eq!(store.runner.call_count(), 1);
    }

    #[test]
    fn failed_lookup_is_a_command_error() {
        let store = PowerShellCertStore::new(ScriptedRunner::new().reply(1, ""));
        let err = store.find_by_subject("demo.test").unwrap_err();
        assert!(matches!(err, CertError::Command(msg) if msg == "exit code 1"));
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), "'it''s'");
    }
}
