//! Administrator rights for commands that touch the web host.
//!
//! When not elevated, `apply` re-launches itself once (through `sudo` on unix,
//! through a UAC `RunAs` prompt on Windows) with `--no-elevate` appended, and
//! waits for the elevated copy to finish. `sudo` resets the environment, so the
//! caller's resolved home and hosts file are handed over through `env`.

use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

/// Flag appended to the re-launched command line.
pub const NO_ELEVATE_FLAG: &str = "--no-elevate";

pub const HOME_ENV: &str = "LOCALSITE_HOME";
pub const HOSTS_FILE_ENV: &str = "LOCALSITE_HOSTS_FILE";

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("Failed to check for administrator rights: {0}")]
    Check(std::io::Error),

    #[error("Cannot locate the localsite executable: {0}")]
    CurrentExe(std::io::Error),

    #[error("Failed to start elevated process: {0}")]
    Relaunch(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ElevationError>;

#[cfg(unix)]
pub fn is_elevated() -> Result<bool> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    Ok(unsafe { libc::geteuid() } == 0)
}

/// `net session` only succeeds from an elevated prompt.
#[cfg(windows)]
pub fn is_elevated() -> Result<bool> {
    let status = Command::new("net")
        .arg("session")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(ElevationError::Check)?;
    Ok(status.success())
}

#[cfg(not(any(unix, windows)))]
pub fn is_elevated() -> Result<bool> {
    Ok(true)
}

/// `sudo env NAME=value... <exe> <args> --no-elevate`
pub fn sudo_command(exe: &Path, args: &[String], env: &[(&str, &Path)]) -> Vec<String> {
    let mut argv = vec!["sudo".to_string()];
    if !env.is_empty() {
        argv.push("env".to_string());
        argv.extend(
            env.iter()
                .map(|(name, value)| format!("{name}={}", value.display())),
        );
    }
    argv.push(exe.display().to_string());
    argv.extend(args.iter().cloned());
    argv.push(NO_ELEVATE_FLAG.to_string());
    argv
}

fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// PowerShell `Start-Process -Verb RunAs -Wait` that exits with the child's code.
pub fn runas_command(exe: &Path, args: &[String]) -> Vec<String> {
    let arg_list = args
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(NO_ELEVATE_FLAG))
        .map(|a| {
            if a.contains(' ') {
                ps_quote(&format!("\"{a}\""))
            } else {
                ps_quote(a)
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    let script = format!(
        "$p = Start-Process -FilePath {} -ArgumentList @({}) -Verb RunAs -Wait -PassThru; exit $p.ExitCode",
        ps_quote(&exe.display().to_string()),
        arg_list
    );
    vec![
        "powershell.exe".to_string(),
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        script,
    ]
}

/// Run this executable again with administrator rights and wait for it.
///
/// `env` is set for the elevated process. Returns its exit code.
pub fn relaunch_elevated(args: &[String], env: &[(&str, &Path)]) -> Result<i32> {
    let exe = std::env::current_exe().map_err(ElevationError::CurrentExe)?;
    let argv = if cfg!(windows) {
        runas_command(&exe, args)
    } else {
        sudo_command(&exe, args, env)
    };
    tracing::info!(command = %argv.join(" "), "Re-launching with administrator rights");

    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .envs(env.iter().copied())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(ElevationError::Relaunch)?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn sudo_command_forwards_args_and_disables_elevation() {
        let argv = sudo_command(
            &PathBuf::from("/usr/local/bin/localsite"),
            &args(&["apply", "--config", "site.json"]),
            &[],
        );
        assert_eq!(
            argv,
            vec![
                "sudo",
                "/usr/local/bin/localsite",
                "apply",
                "--config",
                "site.json",
                "--no-elevate",
            ]
        );
    }

    #[test]
    fn sudo_command_hands_over_home_and_hosts_file() {
        let home = PathBuf::from("/tmp/my home");
        let hosts = PathBuf::from("/tmp/h");
        let argv = sudo_command(
            &PathBuf::from("/usr/local/bin/localsite"),
            &args(&["apply"]),
            &[(HOME_ENV, home.as_path()), (HOSTS_FILE_ENV, hosts.as_path())],
        );
        assert_eq!(
            argv,
            vec![
                "sudo",
                "env",
                "LOCALSITE_HOME=/tmp/my home",
                "LOCALSITE_HOSTS_FILE=/tmp/h",
                "/usr/local/bin/localsite",
                "apply",
                "--no-elevate",
            ]
        );
    }

    #[test]
    fn runas_command_waits_and_propagates_exit_code() {
        let argv = runas_command(
            &PathBuf::from(r"C:\Tools\localsite.exe"),
            &args(&["apply", "--config", r"C:\My Sites\site.json"]),
        );
        assert_eq!(argv[0], "powershell.exe");
        let script = argv.last().unwrap();
        assert!(script.starts_with(r"$p = Start-Process -FilePath 'C:\Tools\localsite.exe'"));
        assert!(script.contains(
            r#"-ArgumentList @('apply','--config','"C:\My Sites\site.json"','--no-elevate')"#
        ));
        assert!(script.contains("-Verb RunAs -Wait -PassThru"));
        assert!(script.ends_with("exit $p.ExitCode"));
    }
}
