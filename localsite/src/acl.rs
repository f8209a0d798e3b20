//! Modify access on the web root for the identities that serve it.

use std::path::Path;

use thiserror::Error;

use crate::exec::CommandRunner;

/// Group every IIS worker process belongs to.
pub const IIS_USERS_GROUP: &str = "IIS_IUSRS";

#[derive(Debug, Error)]
pub enum AclError {
    #[error("Failed to start icacls: {0}")]
    Spawn(std::io::Error),

    #[error("Granting {identity} access to {path} failed: {message}")]
    Grant {
        identity: String,
        path: String,
        message: String,
    },

    #[error("{0}")]
    Backend(String),
}

pub trait FolderPermissions {
    /// Grant each identity inherited modify access on `root` and everything below it.
    fn grant_modify(&self, root: &Path, identities: &[String]) -> Result<(), AclError>;
}

/// The account running this process, `DOMAIN\user` on Windows.
pub fn process_account() -> Option<String> {
    let user = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .ok()
        .filter(|u| !u.is_empty())?;
    match std::env::var("USERDOMAIN") {
        Ok(domain) if !domain.is_empty() => Some(format!("{domain}\\{user}")),
        _ => Some(user),
    }
}

/// Identities that need write access to a site served by `app_pool`.
pub fn site_identities(app_pool: &str) -> Vec<String> {
    let mut identities: Vec<String> = process_account().into_iter().collect();
    identities.push(IIS_USERS_GROUP.to_string());
    identities.push(format!("IIS AppPool\\{app_pool}"));
    identities
}

/// Grants through `icacls`.
pub struct IcaclsPermissions<R> {
    runner: R,
}

impl<R: CommandRunner> IcaclsPermissions<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> FolderPermissions for IcaclsPermissions<R> {
    fn grant_modify(&self, root: &Path, identities: &[String]) -> Result<(), AclError> {
        let path = root.display().to_string();
        for identity in identities {
            let args = vec![
                path.clone(),
                "/grant".to_string(),
                format!("{identity}:(OI)(CI)M"),
                "/T".to_string(),
                "/Q".to_string(),
            ];
            let out = self.runner.run("icacls", &args).map_err(AclError::Spawn)?;
            if !out.success() {
                return Err(AclError::Grant {
                    identity: identity.clone(),
                    path,
                    message: out.failure_message(),
                });
            }
            tracing::debug!(%identity, path = %path, "Granted modify access");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;

    #[test]
    fn identities_end_with_iis_group_and_pool_account() {
        let ids = site_identities("demoPool");
        let n = ids.len();
        assert!(n >= 2);
        assert_eq!(ids[n - 2], "IIS_IUSRS");
        assert_eq!(ids[n - 1], r"IIS AppPool\demoPool");
    }

    #[test]
    fn grants_each_identity_recursively() {
        let acl = IcaclsPermissions::new(ScriptedRunner::new());
        acl.grant_modify(
            Path::new(r"C:\sites\demo"),
            &["IIS_IUSRS".to_string(), r"IIS AppPool\demoPool".to_string()],
        )
        .unwrap();

        assert_eq!(acl.runner.call_count(), 2);
        let (program, args) = acl.runner.call(1);
        assert_eq!(program, "icacls");
        assert_eq!(
            args,
            vec![
                r"C:\sites\demo",
                "/grant",
                r"IIS AppPool\demoPool:(OI)(CI)M",
                "/T",
                "/Q",
            ]
        );
    }

    #[test]
    fn stops_at_first_failed_grant() {
        let acl = IcaclsPermissions::new(
            ScriptedRunner::new().reply(1332, "No mapping between account names and security IDs was done."),
        );
        let err = acl
            .grant_modify(Path::new("/w"), &["ghost".to_string(), "IIS_IUSRS".to_string()])
            .unwrap_err();

        assert!(matches!(err, AclError::Grant { ref identity, .. } if identity == "ghost"));
        assert_eq!(acl.runner.call_count(), 1);
    }
}
