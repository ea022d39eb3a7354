//! Backup of the outgoing certificate pair
//!
//! Backups rename the active files next to themselves under a
//! deterministic, date-stamped name. A second rotation the same day
//! overwrites its own backup (rename semantics, last write wins); a
//! different day always gets a fresh name. Nothing is ever deleted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

/// Per-service backup naming scheme
#[derive(Debug, Clone)]
pub enum BackupScheme {
    /// `{identity}_{YYYYMMDD}.crt.old` / `{identity}_{YYYYMMDD}.key.old`,
    /// stamped with the rotation day.
    HostDate { identity: String },
    /// `cert_{YYYYMMDD}.bak` / `cert_{YYYYMMDD}.bak.key`, stamped with the
    /// outgoing certificate's expiry day.
    ExpiryDate,
}

impl BackupScheme {
    /// Backup file names for the certificate and key.
    pub fn file_names(&self, rotation_day: NaiveDate, expiry_day: NaiveDate) -> (String, String) {
        match self {
            BackupScheme::HostDate { identity } => {
                let stamp = rotation_day.format("%Y%m%d");
                (
                    format!("{}_{}.crt.old", identity, stamp),
                    format!("{}_{}.key.old", identity, stamp),
                )
            }
            BackupScheme::ExpiryDate => {
                let stamp = expiry_day.format("%Y%m%d");
                (
                    format!("cert_{}.bak", stamp),
                    format!("cert_{}.bak.key", stamp),
                )
            }
        }
    }
}

/// Where the outgoing pair ended up
#[derive(Debug, Clone)]
pub struct BackupPaths {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

/// Relocate the active pair to its backup names in the same directory.
pub fn back_up(
    cert_path: &Path,
    key_path: &Path,
    scheme: &BackupScheme,
    rotation_day: NaiveDate,
    expiry_day: NaiveDate,
) -> io::Result<BackupPaths> {
    let (cert_name, key_name) = scheme.file_names(rotation_day, expiry_day);
    let cert_backup = sibling(cert_path, &cert_name);
    let key_backup = sibling(key_path, &key_name);

    fs::rename(cert_path, &cert_backup)?;
    fs::rename(key_path, &key_backup)?;
    info!(
        cert = %cert_backup.display(),
        key = %key_backup.display(),
        "backed up outgoing certificate pair"
    );

    Ok(BackupPaths {
        certificate: cert_backup,
        key: key_backup,
    })
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    path.parent()
        .map(|p| p.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn host_date_names_use_rotation_day() {
        let scheme = BackupScheme::HostDate {
            identity: "web-01".into(),
        };
        let (cert, key) = scheme.file_names(day(2026, 8, 30), day(2026, 10, 1));
        assert_eq!(cert, "web-01_20260830.crt.old");
        assert_eq!(key, "web-01_20260830.key.old");
    }

    #[test]
    fn expiry_date_names_use_expiry_day() {
        let (cert, key) = BackupScheme::ExpiryDate.file_names(day(2026, 8, 30), day(2026, 10, 1));
        assert_eq!(cert, "cert_20261001.bak");
        assert_eq!(key, "cert_20261001.bak.key");
    }

    #[test]
    fn back_up_relocates_without_deleting() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("console.crt");
        let key = dir.path().join("console.key");
        std::fs::write(&cert, b"cert bytes").unwrap();
        std::fs::write(&key, b"key bytes").unwrap();

        let scheme = BackupScheme::HostDate {
            identity: "host".into(),
        };
        let backups = back_up(&cert, &key, &scheme, day(2026, 8, 30), day(2026, 10, 1)).unwrap();

        assert!(!cert.exists());
        assert!(!key.exists());
        assert_eq!(std::fs::read(&backups.certificate).unwrap(), b"cert bytes");
        assert_eq!(std::fs::read(&backups.key).unwrap(), b"key bytes");
    }

    #[test]
    fn same_day_backup_overwrites_but_other_days_survive() {
        let dir = TempDir::new().unwrap();
        let scheme = BackupScheme::HostDate {
            identity: "host".into(),
        };
        let cert = dir.path().join("console.crt");
        let key = dir.path().join("console.key");

        // Yesterday's backup.
        std::fs::write(&cert, b"day one").unwrap();
        std::fs::write(&key, b"k1").unwrap();
        back_up(&cert, &key, &scheme, day(2026, 8, 29), day(2026, 10, 1)).unwrap();

        // Two rotations today; the second wins today's name.
        std::fs::write(&cert, b"day two, first").unwrap();
        std::fs::write(&key, b"k2").unwrap();
        back_up(&cert, &key, &scheme, day(2026, 8, 30), day(2026, 10, 1)).unwrap();
        std::fs::write(&cert, b"day two, second").unwrap();
        std::fs::write(&key, b"k3").unwrap();
        let backups =
            back_up(&cert, &key, &scheme, day(2026, 8, 30), day(2026, 10, 1)).unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("host_20260829.crt.old")).unwrap(),
            b"day one"
        );
        assert_eq!(
            std::fs::read(&backups.certificate).unwrap(),
            b"day two, second"
        );
    }
}
