//! Rotation engine for certkeeper
//!
//! Drives the linear rotation workflow over a service profile: validate
//! the installed pair, classify urgency, resolve replacement material,
//! validate it, back up, install, and restart the dependent service.

pub mod backup;
pub mod engine;
pub mod journal;
pub mod profile;
pub mod service;

pub use backup::{BackupPaths, BackupScheme};
pub use engine::{RotationEngine, RotationError, RotationReport};
pub use profile::ServiceProfile;
pub use service::{ContainerController, ServiceController, ServiceError, SystemdController};
