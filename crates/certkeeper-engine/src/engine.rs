//! The rotation workflow
//!
//! A linear state machine; every failure is terminal for the run. Because
//! backup always precedes install, a failure at or after install never
//! loses the previous valid pair: it survives under its backup name.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use certkeeper_pki::{convert, expiry, pair, ConvertError, ExpiryError, ExpiryStatus, MaterialKind, PairError};
use certkeeper_source::{CertificateMaterial, MaterialSource, SourceError};

use crate::backup::{self, BackupPaths};
use crate::journal;
use crate::profile::ServiceProfile;
use crate::service::{ServiceController, ServiceError};

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("installed certificate pair failed validation: {0}")]
    CurrentInvalid(#[source] PairError),

    #[error("installed certificate and key do not match")]
    CurrentMismatch,

    #[error("replacement certificate pair failed validation: {0}")]
    NewInvalid(#[source] PairError),

    #[error("replacement certificate and key do not match")]
    NewMismatch,

    #[error(transparent)]
    Expiry(#[from] ExpiryError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("install verification failed: {path} missing after copy")]
    Install { path: PathBuf },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("service {identity} did not report active after restart")]
    RestartVerificationFailed { identity: String },

    #[error("I/O error during rotation: {0}")]
    Io(#[from] std::io::Error),
}

/// What a completed rotation did
#[derive(Debug)]
pub struct RotationReport {
    pub service: String,
    /// Expiry status of the certificate that was replaced.
    pub outgoing: ExpiryStatus,
    /// Where the outgoing pair was relocated.
    pub backups: BackupPaths,
    pub installed_cert: PathBuf,
    pub installed_key: PathBuf,
}

/// Drives the rotation workflow for one service profile.
pub struct RotationEngine<'a> {
    profile: &'a ServiceProfile,
    controller: &'a dyn ServiceController,
}

impl<'a> RotationEngine<'a> {
    pub fn new(profile: &'a ServiceProfile, controller: &'a dyn ServiceController) -> Self {
        Self {
            profile,
            controller,
        }
    }

    /// Classify the currently installed certificate without mutating
    /// anything.
    pub fn status(&self, now: DateTime<Utc>) -> Result<ExpiryStatus, RotationError> {
        let cert = fs::read(&self.profile.cert_path)?;
        Ok(expiry::classify(&cert, now, &self.profile.thresholds)?)
    }

    /// Run the full rotation against replacement material from `source`.
    ///
    /// No step is retried and nothing completed is rolled back; the backup
    /// taken before install is the recovery point.
    pub async fn rotate(
        &self,
        source: &dyn MaterialSource,
        now: DateTime<Utc>,
    ) -> Result<RotationReport, RotationError> {
        let p = self.profile;

        // Prove the installed pair before touching anything.
        let current_cert = fs::read(&p.cert_path)?;
        let current_key = fs::read(&p.key_path)?;
        match pair::matches(&current_cert, &current_key) {
            Ok(true) => {}
            Ok(false) => return Err(RotationError::CurrentMismatch),
            Err(e) => return Err(RotationError::CurrentInvalid(e)),
        }

        // Classify the outgoing certificate for the report and the
        // backup name.
        let outgoing = expiry::classify(&current_cert, now, &p.thresholds)?;
        info!(
            service = %p.name,
            days_remaining = outgoing.days_remaining,
            tier = %outgoing.tier,
            "classified installed certificate"
        );

        // Pull replacement material into staging.
        let mut material = source.resolve().await?;

        // Some services only accept PEM on disk.
        if p.normalize_to_pem {
            material = self.normalize(material)?;
        }

        // Prove the replacement pair before the old one is displaced.
        match pair::matches(&material.certificate, &material.key) {
            Ok(true) => {}
            Ok(false) => return Err(RotationError::NewMismatch),
            Err(e) => return Err(RotationError::NewInvalid(e)),
        }

        // Relocate the active pair. From here on the old pair lives
        // only under its backup name.
        let backups = backup::back_up(
            &p.cert_path,
            &p.key_path,
            &p.backup,
            now.date_naive(),
            outgoing.not_after.date_naive(),
        )?;

        // Install by copy, never move. The sourced material stays where
        // the resolver put it.
        fs::copy(&material.cert_path, &p.cert_path)?;
        fs::copy(&material.key_path, &p.key_path)?;
        set_material_permissions(&p.cert_path, &p.key_path)?;

        // Both paths must exist after the copy.
        for path in [&p.cert_path, &p.key_path] {
            if !path.exists() {
                return Err(RotationError::Install { path: path.clone() });
            }
        }
        info!(
            service = %p.name,
            cert = %p.cert_path.display(),
            "installed replacement certificate pair"
        );

        // Restart and confirm. A failed confirmation is reported but the
        // swap stands; rolling back a valid certificate over a
        // service-level symptom would not be clearly correct.
        self.controller.restart(&p.restart_identity)?;
        if !self.controller.is_active(&p.restart_identity)? {
            return Err(RotationError::RestartVerificationFailed {
                identity: p.restart_identity.clone(),
            });
        }

        // Journal trouble is worth a warning, not a failed run.
        if let Some(dir) = &p.journal_dir {
            if let Err(e) = journal::record_completion(dir, &p.name, now) {
                warn!(error = %e, "could not write completion journal");
            }
        }

        Ok(RotationReport {
            service: p.name.clone(),
            outgoing,
            backups,
            installed_cert: p.cert_path.clone(),
            installed_key: p.key_path.clone(),
        })
    }

    fn normalize(&self, material: CertificateMaterial) -> Result<CertificateMaterial, RotationError> {
        let staging = &self.profile.staging_dir;
        let cert_path = convert::normalize(&material.cert_path, MaterialKind::Certificate, staging)?;
        let key_path = convert::normalize(&material.key_path, MaterialKind::PrivateKey, staging)?;

        let certificate = if cert_path == material.cert_path {
            material.certificate
        } else {
            fs::read(&cert_path)?
        };
        let key = if key_path == material.key_path {
            material.key
        } else {
            fs::read(&key_path)?
        };

        Ok(CertificateMaterial {
            certificate,
            key,
            cert_path,
            key_path,
        })
    }
}

#[cfg(unix)]
fn set_material_permissions(cert_path: &Path, key_path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(cert_path, fs::Permissions::from_mode(0o644))?;
    fs::set_permissions(key_path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_material_permissions(_cert_path: &Path, _key_path: &Path) -> std::io::Result<()> {
    Ok(())
}
