//! Built-in service profiles
//!
//! Two console flavors are managed on this host: the systems-management
//! console (a systemd socket unit with certificates under a fixed
//! directory) and the container-management console (certificates inside a
//! directory mounted into the container). Each flavor is one
//! `ServiceProfile` plus the matching service controller.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ValueEnum;

use certkeeper_engine::{
    BackupScheme, ContainerController, ServiceController, ServiceProfile, SystemdController,
};
use certkeeper_pki::Thresholds;
use certkeeper_source::store::{CERT_FILE, CERT_PATH, KEY_FILE};
use certkeeper_source::{CredentialStore, FetchProfile};

use crate::introspect;

const CONSOLE_CERT_DIR: &str = "/etc/cockpit/ws-certs.d";
const CONSOLE_UNIT: &str = "cockpit.socket";
const CONTAINER_NAME: &str = "portainer";
const CONTAINER_RUNTIME: &str = "docker";
const CONTAINER_CERT_MOUNT: &str = "/certs";
const STAGING_ROOT: &str = "/var/lib/certkeeper";
const JOURNAL_DIR: &str = "/var/log/certkeeper";

/// Which managed console to operate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceKind {
    /// Host systems-management console (systemd)
    Console,
    /// Container-management console (container runtime)
    Container,
}

impl ServiceKind {
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Console => "console",
            ServiceKind::Container => "container",
        }
    }
}

pub struct BuiltService {
    pub profile: ServiceProfile,
    pub controller: Box<dyn ServiceController>,
}

/// Construct the profile and controller for a console flavor.
///
/// The credential store may override the certificate file names
/// (`CERT_FILE` / `KEY_FILE`) and, for the container flavor, the
/// certificate directory (`CERT_PATH`) in place of runtime introspection.
pub fn build(kind: ServiceKind, store: &CredentialStore) -> Result<BuiltService> {
    let cert_file = store
        .get(CERT_FILE)?
        .unwrap_or_else(|| default_cert_file(kind).to_string());
    let key_file = store
        .get(KEY_FILE)?
        .unwrap_or_else(|| default_key_file(kind).to_string());

    match kind {
        ServiceKind::Console => {
            let dir = PathBuf::from(CONSOLE_CERT_DIR);
            if !dir.is_dir() {
                anyhow::bail!(
                    "{} does not exist; is the host console installed?",
                    dir.display()
                );
            }
            Ok(BuiltService {
                profile: ServiceProfile {
                    name: kind.name().into(),
                    cert_path: dir.join(cert_file),
                    key_path: dir.join(key_file),
                    staging_dir: PathBuf::from(STAGING_ROOT).join(kind.name()),
                    thresholds: Thresholds::new(60, 30),
                    backup: BackupScheme::HostDate {
                        identity: hostname(),
                    },
                    normalize_to_pem: false,
                    fetch_profile: FetchProfile::Split,
                    restart_identity: CONSOLE_UNIT.into(),
                    journal_dir: Some(PathBuf::from(JOURNAL_DIR)),
                },
                controller: Box::new(SystemdController),
            })
        }
        ServiceKind::Container => {
            let dir = match store.get(CERT_PATH)? {
                Some(path) => PathBuf::from(path),
                None => introspect::container_mount_source(
                    CONTAINER_RUNTIME,
                    CONTAINER_NAME,
                    CONTAINER_CERT_MOUNT,
                )
                .context("could not locate the container console certificate directory")?,
            };
            Ok(BuiltService {
                profile: ServiceProfile {
                    name: kind.name().into(),
                    cert_path: dir.join(cert_file),
                    key_path: dir.join(key_file),
                    staging_dir: PathBuf::from(STAGING_ROOT).join(kind.name()),
                    thresholds: Thresholds::new(31, 7),
                    backup: BackupScheme::ExpiryDate,
                    normalize_to_pem: true,
                    fetch_profile: FetchProfile::Combined,
                    restart_identity: CONTAINER_NAME.into(),
                    journal_dir: Some(PathBuf::from(JOURNAL_DIR)),
                },
                controller: Box::new(ContainerController::default()),
            })
        }
    }
}

fn default_cert_file(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Console => "console.crt",
        ServiceKind::Container => "portainer.crt",
    }
}

fn default_key_file(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Console => "console.key",
        ServiceKind::Container => "portainer.key",
    }
}

/// Backup identity for the host console: the machine's hostname.
fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "console".to_string())
}
