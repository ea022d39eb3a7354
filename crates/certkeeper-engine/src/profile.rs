//! Service profile
//!
//! One value object describes everything the engine needs to know about a
//! managed service. Constructed once by the caller and passed down; no
//! ambient configuration anywhere else.

use std::path::PathBuf;

use certkeeper_pki::Thresholds;
use certkeeper_source::FetchProfile;

use crate::backup::BackupScheme;

/// Everything the rotation engine needs to know about one managed service.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    /// Short name used in logs and the completion journal.
    pub name: String,
    /// Active certificate path the service reads at startup.
    pub cert_path: PathBuf,
    /// Active private key path.
    pub key_path: PathBuf,
    /// Scratch directory for sourced and converted material.
    pub staging_dir: PathBuf,
    /// Urgency tier thresholds for this service.
    pub thresholds: Thresholds,
    /// Backup naming scheme for the outgoing pair.
    pub backup: BackupScheme,
    /// Whether sourced material must be normalized to PEM first.
    pub normalize_to_pem: bool,
    /// How the remote API serves this service's key material.
    pub fetch_profile: FetchProfile,
    /// Identity handed to the service controller for restart/is-active.
    pub restart_identity: String,
    /// Where completion timestamps are journaled, if anywhere.
    pub journal_dir: Option<PathBuf>,
}
