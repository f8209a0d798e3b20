//! Portable certificate store backed by PEM files
//!
//! Layout under the store root:
//!
//! ```text
//! personal/<THUMBPRINT>.crt   certificate (PEM)
//! personal/<THUMBPRINT>.key   private key (PEM, 0600 on unix)
//! trust/<THUMBPRINT>.crt      trusted copy of a personal certificate
//! ```
//!
//! Thumbprints are the uppercase SHA-256 of the certificate DER.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use localsite_core::{CertificateRecord, StoreLocation, Thumbprint};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use time::{Duration, OffsetDateTime};

use super::store::{CertError, CertificateStore, DEFAULT_VALIDITY_DAYS, Result};

const ORGANIZATION: &str = "localsite";

pub struct PemDirStore {
    root: PathBuf,
    validity_days: i64,
}

impl PemDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }

    pub fn with_validity_days(mut self, days: i64) -> Self {
        self.validity_days = days;
        self
    }

    fn dir(&self, location: StoreLocation) -> PathBuf {
        match location {
            StoreLocation::Personal => self.root.join("personal"),
            StoreLocation::Trust => self.root.join("trust"),
        }
    }

    fn cert_path(&self, location: StoreLocation, thumbprint: &Thumbprint) -> PathBuf {
        self.dir(location).join(format!("{thumbprint}.crt"))
    }

    fn key_path(&self, thumbprint: &Thumbprint) -> PathBuf {
        self.dir(StoreLocation::Personal)
            .join(format!("{thumbprint}.key"))
    }

    /// All readable records in one store, ordered by file name.
    ///
    /// Files that fail to parse are logged and skipped.
    fn list(&self, location: StoreLocation) -> Result<Vec<CertificateRecord>> {
        let dir = self.dir(location);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| CertError::FileRead(dir.clone(), e))? {
            let path = entry.map_err(|e| CertError::FileRead(dir.clone(), e))?.path();
            if path.extension().is_some_and(|ext| ext == "crt") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in &paths {
            match self.load(path, location) {
                Ok(record) => records.push(record),
                Err(CertError::Parse(reason)) => {
                    tracing::warn!(
                        path = %path.display(),
                        %reason,
                        "Skipping unreadable certificate file"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    fn load(&self, path: &Path, location: StoreLocation) -> Result<CertificateRecord> {
        let pem = fs::read(path).map_err(|e| CertError::FileRead(path.to_path_buf(), e))?;
        record_from_pem(&pem, location)
    }

    fn generate(&self, cn: &str) -> Result<(String, String)> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        dn.push(DnType::OrganizationName, ORGANIZATION);
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.subject_alt_names = vec![SanType::DnsName(cn.try_into().map_err(|e| {
            CertError::Generation(format!("Invalid DNS name '{}': {}", cn, e))
        })?)];

        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1); // Allow for clock skew
        params.not_after = now + Duration::days(self.validity_days);

        let key_pair = KeyPair::generate()
            .map_err(|e| CertError::Generation(format!("Failed to generate key pair: {}", e)))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertError::Generation(e.to_string()))?;

        Ok((cert.pem(), key_pair.serialize_pem()))
    }
}

/// Parse a PEM certificate into a record; the thumbprint is derived from its DER.
fn record_from_pem(pem: &[u8], location: StoreLocation) -> Result<CertificateRecord> {
    let (_, pem) =
        x509_parser::pem::parse_x509_pem(pem).map_err(|e| CertError::Parse(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| CertError::Parse(e.to_string()))?;

    let subject_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .ok_or_else(|| CertError::Parse("certificate has no common name".to_string()))?
        .to_string();

    Ok(CertificateRecord {
        subject_name,
        thumbprint: Thumbprint::new(hex::encode(Sha256::digest(&pem.contents))),
        not_after: cert.validity().not_after.to_datetime(),
        store_location: location,
    })
}

/// Write through a temp file in the same directory so readers never see a partial file.
fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let write_err = |e| CertError::FileWrite(path.to_path_buf(), e);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CertError::FileWrite(dir.to_path_buf(), e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

impl CertificateStore for PemDirStore {
    fn find_by_subject(&self, cn: &str) -> Result<Vec<CertificateRecord>> {
        Ok(self
            .list(StoreLocation::Personal)?
            .into_iter()
            .filter(|r| r.subject_name.eq_ignore_ascii_case(cn))
            .collect())
    }

    fn create(&self, cn: &str) -> Result<CertificateRecord> {
        let (cert_pem, key_pem) = self.generate(cn)?;
        let record = record_from_pem(cert_pem.as_bytes(), StoreLocation::Personal)?;

        let key_path = self.key_path(&record.thumbprint);
        write_file(&key_path, key_pem.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))
                .map_err(|e| CertError::FileWrite(key_path.clone(), e))?;
        }
        write_file(
            &self.cert_path(StoreLocation::Personal, &record.thumbprint),
            cert_pem.as_bytes(),
        )?;

        Ok(record)
    }

    fn delete(&self, record: &CertificateRecord) -> Result<()> {
        let cert_path = self.cert_path(record.store_location, &record.thumbprint);
        if !cert_path.exists() {
            return Err(CertError::NotFound(record.thumbprint.clone()));
        }
        fs::remove_file(&cert_path).map_err(|e| CertError::FileWrite(cert_path.clone(), e))?;

        if record.store_location == StoreLocation::Personal {
            let key_path = self.key_path(&record.thumbprint);
            if key_path.exists() {
                fs::remove_file(&key_path).map_err(|e| CertError::FileWrite(key_path.clone(), e))?;
            }
        }
        Ok(())
    }

    fn install_to_trust(&self, record: &CertificateRecord) -> Result<()> {
        let target = self.cert_path(StoreLocation::Trust, &record.thumbprint);
        if target.exists() {
            return Ok(());
        }

        let source = self.cert_path(StoreLocation::Personal, &record.thumbprint);
        if !source.exists() {
            return Err(CertError::NotFound(record.thumbprint.clone()));
        }
        let pem = fs::read(&source).map_err(|e| CertError::FileRead(source.clone(), e))?;
        write_file(&target, &pem)
    }

    fn find_in_trust(&self, thumbprint: &Thumbprint) -> Result<Option<CertificateRecord>> {
        let path = self.cert_path(StoreLocation::Trust, thumbprint);
        if !path.exists() {
            return Ok(None);
        }
        self.load(&path, StoreLocation::Trust).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_then_find_by_subject() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path());

        let created = store.create("demo.example.com").unwrap();
        assert_eq!(created.subject_name, "demo.example.com");
        assert_eq!(created.store_location, StoreLocation::Personal);
        assert_eq!(created.thumbprint.as_str().len(), 64);

        let days = created.days_until_expiry(OffsetDateTime::now_utc());
        assert!((363..=365).contains(&days), "unexpected validity {days}");

        let found = store.find_by_subject("demo.example.com").unwrap();
        assert_eq!(found, vec![created.clone()]);
        assert!(store.find_by_subject("other.test").unwrap().is_empty());

        let pem = fs::read_to_string(
            temp.path()
                .join("personal")
                .join(format!("{}.crt", created.thumbprint)),
        )
        .unwrap();
        assert!(pem.contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn each_create_gets_a_fresh_thumbprint() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path());

        let a = store.create("demo.test").unwrap();
        let b = store.create("demo.test").unwrap();

        assert_ne!(a.thumbprint, b.thumbprint);
        assert_eq!(store.find_by_subject("demo.test").unwrap().len(), 2);
    }

    #[test]
    fn validity_is_configurable() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path()).with_validity_days(10);

        let created = store.create("short.test").unwrap();
        let days = created.days_until_expiry(OffsetDateTime::now_utc());
        assert!((8..=10).contains(&days), "unexpected validity {days}");
    }

    #[test]
    fn delete_removes_cert_and_key_and_reports_missing() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path());
        let record = store.create("demo.test").unwrap();

        store.delete(&record).unwrap();

        assert!(store.find_by_subject("demo.test").unwrap().is_empty());
        assert!(!store.key_path(&record.thumbprint).exists());
        assert!(matches!(
            store.delete(&record),
            Err(CertError::NotFound(t)) if t == record.thumbprint
        ));
    }

    #[test]
    fn install_to_trust_copies_once() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path());
        let record = store.create("demo.test").unwrap();

        assert!(!store.is_trusted(&record.thumbprint).unwrap());
        store.install_to_trust(&record).unwrap();
        store.install_to_trust(&record).unwrap();

        let trusted = store.find_in_trust(&record.thumbprint).unwrap().unwrap();
        assert_eq!(trusted.store_location, StoreLocation::Trust);
        assert_eq!(trusted.thumbprint, record.thumbprint);
        assert_eq!(fs::read_dir(temp.path().join("trust")).unwrap().count(), 1);

        // deleting the trusted copy leaves the personal one alone
        store.delete(&trusted).unwrap();
        assert!(!store.is_trusted(&record.thumbprint).unwrap());
        assert_eq!(store.find_by_subject("demo.test").unwrap().len(), 1);
    }

    #[test]
    fn install_to_trust_requires_personal_copy() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path());
        let record = store.create("demo.test").unwrap();
        store.delete(&record).unwrap();

        assert!(matches!(
            store.install_to_trust(&record),
            Err(CertError::NotFound(_))
        ));
    }

    #[test]
    fn missing_store_directories_read_as_empty() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path().join("not-created-yet"));
        assert!(store.find_by_subject("demo.test").unwrap().is_empty());
        assert!(
            store
                .find_in_trust(&Thumbprint::new("AB"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn unreadable_certificate_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path());
        let good = store.create("demo.example.com").unwrap();

        let personal = temp.path().join("personal");
        fs::write(
            personal.join("DEAD.crt"),
            "-----BEGIN CERTIFICATE-----\nMIIB\n",
        )
        .unwrap();
        fs::write(personal.join("EMPTY.crt"), "").unwrap();

        assert_eq!(store.find_by_subject("demo.example.com").unwrap(), vec![good]);
        assert!(store.find_by_subject("other.test").unwrap().is_empty());

        let issued = store.create("other.test").unwrap();
        assert_eq!(store.find_by_subject("other.test").unwrap(), vec![issued]);
    }

    #[test]
    fn create_leaves_no_temp_files_behind() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path());
        let record = store.create("demo.test").unwrap();
        store.install_to_trust(&record).unwrap();

        let mut names: Vec<String> = fs::read_dir(temp.path().join("personal"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                format!("{}.crt", record.thumbprint),
                format!("{}.key", record.thumbprint),
            ]
        );
        assert_eq!(fs::read_dir(temp.path().join("trust")).unwrap().count(), 1);
    }

    #[test]
    fn invalid_hostname_fails_generation() {
        let temp = TempDir::new().unwrap();
        let store = PemDirStore::new(temp.path());
        assert!(matches!(
            store.create("bücher.test"),
            Err(CertError::Generation(_))
        ));
    }
}
