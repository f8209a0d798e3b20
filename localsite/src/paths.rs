use std::path::PathBuf;
#[cfg(test)]
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Get localsite's home directory (`LOCALSITE_HOME`, else `~/.localsite`).
///
/// Holds `localsite.toml`, the portable certificate store and the local
/// backend's host state.
pub fn localsite_home_dir() -> Result<PathBuf, std::io::Error> {
    if let Ok(v) = std::env::var("LOCALSITE_HOME")
        && !v.trim().is_empty()
    {
        return Ok(PathBuf::from(v));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine home directory",
        )
    })?;

    Ok(home.join(".localsite"))
}

/// Certificate store root for the local backend.
pub fn cert_store_dir(home: &std::path::Path) -> PathBuf {
    home.join("certs")
}

/// Host state file for the local backend.
pub fn host_state_file(home: &std::path::Path) -> PathBuf {
    home.join("host-state.json")
}

#[cfg(test)]
pub(crate) fn test_home_env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .expect("LOCALSITE_HOME test env lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn home_dir_respects_env_override() {
        let _lock = test_home_env_lock();
        let previous = std::env::var_os("LOCALSITE_HOME");
        let temp = TempDir::new().unwrap();
        unsafe {
            std::env::set_var("LOCALSITE_HOME", temp.path());
        }
        let got = localsite_home_dir().unwrap();
        match previous {
            Some(value) => unsafe { std::env::set_var("LOCALSITE_HOME", value) },
            None => unsafe { std::env::remove_var("LOCALSITE_HOME") },
        }
        assert_eq!(got, temp.path());
    }

    #[test]
    fn backend_files_live_under_home() {
        let home = Path::new("/home/me/.localsite");
        assert_eq!(cert_store_dir(home), home.join("certs"));
        assert_eq!(host_state_file(home), home.join("host-state.json"));
    }
}
