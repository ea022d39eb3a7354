//! End-to-end rotation scenarios against real PEM fixtures and a fake
//! service controller.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use certkeeper_engine::{
    BackupScheme, RotationEngine, RotationError, ServiceController, ServiceError, ServiceProfile,
};
use certkeeper_pki::Thresholds;
use certkeeper_source::{
    CertificateMaterial, FetchProfile, LocalSource, MaterialSource, SourceError,
};

fn fixture(name: &str) -> Vec<u8> {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read(path).unwrap()
}

/// Service controller that records restarts and answers a fixed liveness.
struct FakeController {
    active: bool,
    restarts: Mutex<Vec<String>>,
}

impl FakeController {
    fn new(active: bool) -> Self {
        Self {
            active,
            restarts: Mutex::new(Vec::new()),
        }
    }

    fn restart_count(&self) -> usize {
        self.restarts.lock().unwrap().len()
    }
}

impl ServiceController for FakeController {
    fn restart(&self, identity: &str) -> Result<(), ServiceError> {
        self.restarts.lock().unwrap().push(identity.to_string());
        Ok(())
    }

    fn is_active(&self, _identity: &str) -> Result<bool, ServiceError> {
        Ok(self.active)
    }
}

/// Source that fails the way a rejected remote fetch does.
struct ForbiddenSource;

#[async_trait]
impl MaterialSource for ForbiddenSource {
    async fn resolve(&self) -> Result<CertificateMaterial, SourceError> {
        Err(SourceError::Status {
            status: 403,
            url: "https://authority.internal/api/v1.0/certificates/console".into(),
        })
    }
}

struct Setup {
    _root: TempDir,
    profile: ServiceProfile,
    new_dir: PathBuf,
}

/// Lay out an active pair, a directory of replacement material, and a
/// profile pointing at both.
fn setup(new_cert: &str, new_key: &str) -> Setup {
    let root = TempDir::new().unwrap();
    let active_dir = root.path().join("active");
    let new_dir = root.path().join("incoming");
    std::fs::create_dir_all(&active_dir).unwrap();
    std::fs::create_dir_all(&new_dir).unwrap();

    let cert_path = active_dir.join("console.crt");
    let key_path = active_dir.join("console.key");
    std::fs::write(&cert_path, fixture("server.crt")).unwrap();
    std::fs::write(&key_path, fixture("server.key")).unwrap();

    std::fs::write(new_dir.join("incoming.crt"), fixture(new_cert)).unwrap();
    std::fs::write(new_dir.join(new_key), fixture(new_key)).unwrap();

    let profile = ServiceProfile {
        name: "console".into(),
        cert_path,
        key_path,
        staging_dir: root.path().join("staging"),
        thresholds: Thresholds::new(60, 30),
        backup: BackupScheme::HostDate {
            identity: "host".into(),
        },
        normalize_to_pem: false,
        fetch_profile: FetchProfile::Split,
        restart_identity: "console.socket".into(),
        journal_dir: Some(root.path().join("log")),
    };

    Setup {
        _root: root,
        profile,
        new_dir,
    }
}

fn backup_names_for(now: chrono::DateTime<Utc>, identity: &str) -> (String, String) {
    let stamp = now.date_naive().format("%Y%m%d");
    (
        format!("{}_{}.crt.old", identity, stamp),
        format!("{}_{}.key.old", identity, stamp),
    )
}

fn old_backups_present(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().ends_with(".old"))
}

#[tokio::test]
async fn successful_rotation_backs_up_installs_and_restarts() {
    let s = setup("new.crt", "new.key");
    let controller = FakeController::new(true);
    let engine = RotationEngine::new(&s.profile, &controller);
    let source = LocalSource::new(&s.new_dir);

    let now = Utc::now();
    let report = engine.rotate(&source, now).await.unwrap();

    // Active path holds exactly the new material.
    assert_eq!(
        std::fs::read(&s.profile.cert_path).unwrap(),
        fixture("new.crt")
    );
    assert_eq!(
        std::fs::read(&s.profile.key_path).unwrap(),
        fixture("new.key")
    );

    // Outgoing pair survives under its deterministic backup names.
    let active_dir = s.profile.cert_path.parent().unwrap();
    let (cert_backup, key_backup) = backup_names_for(now, "host");
    assert_eq!(
        std::fs::read(active_dir.join(&cert_backup)).unwrap(),
        fixture("server.crt")
    );
    assert_eq!(
        std::fs::read(active_dir.join(&key_backup)).unwrap(),
        fixture("server.key")
    );
    assert_eq!(report.backups.certificate, active_dir.join(cert_backup));

    // The sourced material was copied, not moved.
    assert!(s.new_dir.join("incoming.crt").exists());

    assert_eq!(controller.restart_count(), 1);

    // Completion journal was written.
    let journal_dir = s.profile.journal_dir.as_ref().unwrap();
    assert!(journal_dir
        .join(format!("console_{}.log", now.date_naive().format("%Y%m%d")))
        .exists());
}

#[tokio::test]
async fn mismatched_replacement_never_touches_the_active_path() {
    // incoming.crt pairs with no key on disk; the foreign key is picked up
    // by enumeration and fails validation.
    let s = setup("new.crt", "other.key");
    let controller = FakeController::new(true);
    let engine = RotationEngine::new(&s.profile, &controller);
    let source = LocalSource::new(&s.new_dir);

    let err = engine.rotate(&source, Utc::now()).await.unwrap_err();
    assert!(matches!(err, RotationError::NewMismatch));

    // Validation failures are side-effect free on the installed state.
    assert_eq!(
        std::fs::read(&s.profile.cert_path).unwrap(),
        fixture("server.crt")
    );
    assert_eq!(
        std::fs::read(&s.profile.key_path).unwrap(),
        fixture("server.key")
    );
    assert!(!old_backups_present(s.profile.cert_path.parent().unwrap()));
    assert_eq!(controller.restart_count(), 0);
}

#[tokio::test]
async fn restart_verification_failure_keeps_the_new_material() {
    let s = setup("new.crt", "new.key");
    let controller = FakeController::new(false);
    let engine = RotationEngine::new(&s.profile, &controller);
    let source = LocalSource::new(&s.new_dir);

    let err = engine.rotate(&source, Utc::now()).await.unwrap_err();
    assert!(matches!(
        err,
        RotationError::RestartVerificationFailed { .. }
    ));

    // The swap itself succeeded and is not rolled back.
    assert_eq!(
        std::fs::read(&s.profile.cert_path).unwrap(),
        fixture("new.crt")
    );
    assert!(old_backups_present(s.profile.cert_path.parent().unwrap()));
}

#[tokio::test]
async fn failed_fetch_leaves_the_active_path_unchanged() {
    let s = setup("new.crt", "new.key");
    let controller = FakeController::new(true);
    let engine = RotationEngine::new(&s.profile, &controller);

    let err = engine.rotate(&ForbiddenSource, Utc::now()).await.unwrap_err();
    assert!(matches!(
        err,
        RotationError::Source(SourceError::Status { status: 403, .. })
    ));
    assert_eq!(
        std::fs::read(&s.profile.cert_path).unwrap(),
        fixture("server.crt")
    );
    assert!(!old_backups_present(s.profile.cert_path.parent().unwrap()));
}

#[tokio::test]
async fn status_classifies_without_mutation() {
    let s = setup("new.crt", "new.key");
    let controller = FakeController::new(true);
    let engine = RotationEngine::new(&s.profile, &controller);

    let status = engine.status(Utc::now()).unwrap();
    assert!(status.days_remaining > 0);
    assert_eq!(
        std::fs::read(&s.profile.cert_path).unwrap(),
        fixture("server.crt")
    );
}
