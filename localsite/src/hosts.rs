//! Hosts file editing
//!
//! Line-level, idempotent edits of the local name-resolution override file.
//! Surviving lines are written back byte-for-byte in their original order.
//!
//! A line counts as a mapping only when it splits into exactly two fields on
//! runs of spaces/tabs. A mapping followed by an inline comment
//! (`127.0.0.1  app.test  # note`) has more fields, so it is never matched and
//! never removed. That is accepted behavior: such lines are left for the
//! operator to clean up.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use localsite_core::HostsEntry;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Address hosts entries point at.
pub const LOOPBACK_IP: &str = "127.0.0.1";

#[derive(Debug, Error)]
pub enum HostsError {
    #[error("Failed to read hosts file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to write hosts file {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Hosts file entries must be ASCII, got '{0}'")]
    NonAscii(String),
}

pub type Result<T> = std::result::Result<T, HostsError>;

/// Platform location of the hosts file.
pub fn default_hosts_path() -> PathBuf {
    if cfg!(windows) {
        let root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
        PathBuf::from(root)
            .join("System32")
            .join("drivers")
            .join("etc")
            .join("hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

/// True when `line` is a two-field mapping whose hostname field is `hostname`.
fn is_mapping_for(line: &str, hostname: &str) -> bool {
    let mut fields = line
        .trim_end_matches(['\r', '\n'])
        .split([' ', '\t'])
        .filter(|f| !f.is_empty());

    match (fields.next(), fields.next(), fields.next()) {
        (Some(_ip), Some(name), None) => name == hostname,
        _ => false,
    }
}

fn line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") { "\r\n" } else { "\n" }
}

pub struct HostsFileEditor {
    path: PathBuf,
}

impl HostsFileEditor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| HostsError::Read(self.path.clone(), e))
    }

    /// The two-field mapping for `hostname`, if any. Later lines win.
    pub fn mapping(&self, hostname: &str) -> Result<Option<HostsEntry>> {
        let content = self.read()?;
        Ok(content
            .lines()
            .filter(|line| is_mapping_for(line, hostname))
            .filter_map(|line| line.split([' ', '\t']).find(|f| !f.is_empty()))
            .last()
            .map(|ip| HostsEntry::new(ip, hostname)))
    }

    /// Drop every two-field mapping for `hostname`.
    ///
    /// Returns whether anything was removed. When nothing matches the file is
    /// not touched.
    pub fn remove(&self, hostname: &str) -> Result<bool> {
        let content = self.read()?;

        let mut kept = String::with_capacity(content.len());
        let mut removed = 0usize;
        for line in content.split_inclusive('\n') {
            if is_mapping_for(line, hostname) {
                removed += 1;
            } else {
                kept.push_str(line);
            }
        }

        if removed == 0 {
            tracing::debug!(hostname, path = %self.path.display(), "No hosts entry to remove");
            return Ok(false);
        }

        self.replace(&kept)?;
        tracing::info!(hostname, removed, path = %self.path.display(), "Removed hosts entries");
        Ok(true)
    }

    /// Map `hostname` to `ip`, replacing any existing two-field mapping for it.
    pub fn add(&self, ip: &str, hostname: &str) -> Result<()> {
        for value in [ip, hostname] {
            if !value.is_ascii() {
                return Err(HostsError::NonAscii(value.to_string()));
            }
        }

        self.remove(hostname)?;

        let content = self.read()?;
        let newline = line_ending(&content);
        let mut line = String::new();
        if !content.is_empty() && !content.ends_with('\n') {
            line.push_str(newline);
        }
        line.push_str(&HostsEntry::new(ip, hostname).to_string());
        line.push_str(newline);

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| HostsError::Write(self.path.clone(), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| HostsError::Write(self.path.clone(), e))?;

        tracing::info!(ip, hostname, path = %self.path.display(), "Added hosts entry");
        Ok(())
    }

    /// Swap in new content through a temp file in the same directory.
    fn replace(&self, content: &str) -> Result<()> {
        let write_err = |e| HostsError::Write(self.path.clone(), e);
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let permissions = fs::metadata(&self.path).map_err(write_err)?.permissions();
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(content.as_bytes()).map_err(write_err)?;
        tmp.as_file().set_permissions(permissions).map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
