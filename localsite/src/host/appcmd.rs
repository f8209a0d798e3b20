//! IIS administration through `appcmd.exe` and `netsh http`
//!
//! `appcmd list site /name:X` prints one line per site:
//!
//! ```text
//! SITE "demo" (id:2,bindings:http/*:80:demo.localtest.me,https/*:443:demo.localtest.me,state:Started)
//! ```
//!
//! Certificates are attached per host name (SNI) with
//! `netsh http add sslcert hostnameport=<host>:443`.

use std::path::Path;

use localsite_core::{Binding, Protocol, SslFlags, Thumbprint};

use super::{HostAdminClient, HostApiError, Result};
use crate::exec::{CommandOutput, CommandRunner};

const NETSH: &str = "netsh";

/// Application id IIS registers its SSL bindings under.
const IIS_APP_ID: &str = "{4dc3e181-e14b-4a21-b022-59fc669b0914}";

/// `%windir%\system32\inetsrv\appcmd.exe`
pub fn default_appcmd_path() -> String {
    let windir = std::env::var("windir")
        .or_else(|_| std::env::var("SystemRoot"))
        .unwrap_or_else(|_| r"C:\Windows".to_string());
    format!(r"{windir}\system32\inetsrv\appcmd.exe")
}

/// Pull the binding list out of one `appcmd list site` line.
///
/// Bindings this tool does not model (`net.tcp`, `net.pipe`, ...) are skipped.
fn parse_site_line(line: &str, site: &str) -> Option<Vec<Binding>> {
    let rest = line.trim().strip_prefix("SITE \"")?;
    let (name, rest) = rest.split_once('"')?;
    if !name.eq_ignore_ascii_case(site) {
        return None;
    }

    let Some(start) = rest.find("bindings:") else {
        return Some(Vec::new());
    };
    let list = &rest[start + "bindings:".len()..];
    let end = list
        .find(",state:")
        .or_else(|| list.rfind(')'))
        .unwrap_or(list.len());

    Some(
        list[..end]
            .split(',')
            .filter_map(|b| b.trim().parse::<Binding>().ok())
            .collect(),
    )
}

/// appcmd reports a missing object either with no output or a "Cannot find" error.
fn is_not_found(out: &CommandOutput) -> bool {
    let text = format!("{}{}", out.stdout, out.stderr);
    text.trim().is_empty() || text.contains("Cannot find")
}

pub struct AppCmdClient<R> {
    runner: R,
    appcmd: String,
}

impl<R: CommandRunner> AppCmdClient<R> {
    pub fn new(runner: R) -> Self {
        Self::with_appcmd_path(runner, default_appcmd_path())
    }

    pub fn with_appcmd_path(runner: R, appcmd: impl Into<String>) -> Self {
        Self {
            runner,
            appcmd: appcmd.into(),
        }
    }

    fn run(&self, program: &str, args: Vec<String>) -> Result<CommandOutput> {
        self.runner
            .run(program, &args)
            .map_err(|source| HostApiError::Spawn {
                program: program.to_string(),
                source,
            })
    }

    fn run_ok(&self, program: &str, args: Vec<String>) -> Result<CommandOutput> {
        let command = format!("{} {}", program, args.first().map(String::as_str).unwrap_or(""));
        let out = self.run(program, args)?;
        if !out.success() {
            return Err(HostApiError::Command {
                command: command.trim_end().to_string(),
                message: out.failure_message(),
            });
        }
        Ok(out)
    }

    fn appcmd(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_ok(&self.appcmd, args.iter().map(|a| a.to_string()).collect())
    }

    fn list(&self, kind: &str, name: &str) -> Result<Option<String>> {
        let out = self.run(
            &self.appcmd,
            vec!["list".to_string(), kind.to_string(), format!("/name:{name}")],
        )?;
        if out.success() && !out.stdout.trim().is_empty() {
            return Ok(Some(out.stdout));
        }
        if is_not_found(&out) {
            return Ok(None);
        }
        Err(HostApiError::Command {
            command: format!("appcmd list {kind}"),
            message: out.failure_message(),
        })
    }
}

impl<R: CommandRunner> HostAdminClient for AppCmdClient<R> {
    fn app_pool_exists(&self, name: &str) -> Result<bool> {
        Ok(self.list("apppool", name)?.is_some())
    }

    fn create_app_pool(&self, name: &str, runtime_version: &str) -> Result<()> {
        self.appcmd(&[
            "add",
            "apppool",
            &format!("/name:{name}"),
            &format!("/managedRuntimeVersion:{runtime_version}"),
        ])?;
        Ok(())
    }

    fn site_bindings(&self, site: &str) -> Result<Option<Vec<Binding>>> {
        let Some(stdout) = self.list("site", site)? else {
            return Ok(None);
        };
        Ok(stdout.lines().find_map(|line| parse_site_line(line, site)))
    }

    fn delete_site(&self, site: &str) -> Result<()> {
        self.appcmd(&["delete", "site", &format!("/site.name:{site}")])?;
        Ok(())
    }

    fn create_site(
        &self,
        site: &str,
        binding: &Binding,
        physical_path: &Path,
        app_pool: &str,
    ) -> Result<()> {
        self.appcmd(&[
            "add",
            "site",
            &format!("/name:{site}"),
            &format!("/bindings:{binding}"),
            &format!("/physicalPath:{}", physical_path.display()),
        ])?;
        self.appcmd(&[
            "set",
            "app",
            &format!("{site}/"),
            &format!("/applicationPool:{app_pool}"),
        ])?;
        Ok(())
    }

    fn add_binding(&self, site: &str, binding: &Binding, ssl_flags: SslFlags) -> Result<()> {
        let mut binding_arg = format!(
            "/+bindings.[protocol='{}',bindingInformation='{}'",
            binding.protocol,
            binding.binding_information()
        );
        if binding.protocol == Protocol::Https {
            binding_arg.push_str(&format!(",sslFlags='{}'", ssl_flags.bits()));
        }
        binding_arg.push(']');

        self.appcmd(&["set", "site", &format!("/site.name:{site}"), &binding_arg])?;
        Ok(())
    }

    fn attach_certificate(
        &self,
        _site: &str,
        binding: &Binding,
        thumbprint: &Thumbprint,
    ) -> Result<()> {
        let hostnameport = format!("hostnameport={}:{}", binding.host_header, binding.port);

        // A stale registration from an earlier run blocks the add.
        let stale = self.run(
            NETSH,
            vec![
                "http".to_string(),
                "delete".to_string(),
                "sslcert".to_string(),
                hostnameport.clone(),
            ],
        )?;
        if !stale.success() {
            tracing::debug!(%hostnameport, "No previous SSL registration");
        }

        self.run_ok(
            NETSH,
            vec![
                "http".to_string(),
                "add".to_string(),
                "sslcert".to_string(),
                hostnameport,
                format!("certhash={thumbprint}"),
                format!("appid={IIS_APP_ID}"),
                "certstorename=MY".to_string(),
            ],
        )?;
        Ok(())
    }
}
