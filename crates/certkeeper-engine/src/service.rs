//! Service control
//!
//! The engine only needs two operations from the host: restart a service
//! and ask whether it is active. Both are delegated to the platform's
//! service manager through the `ServiceController` trait so the engine is
//! testable without touching systemd or a container runtime.

use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to run {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command:?} exited with {status}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
    },
}

/// Restart and liveness queries against the host's service manager.
pub trait ServiceController {
    fn restart(&self, identity: &str) -> Result<(), ServiceError>;
    fn is_active(&self, identity: &str) -> Result<bool, ServiceError>;
}

fn run(program: &str, args: &[&str]) -> Result<std::process::Output, ServiceError> {
    let rendered = format!("{} {}", program, args.join(" "));
    debug!(command = %rendered, "running service manager command");
    Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ServiceError::Spawn {
            command: rendered,
            source,
        })
}

/// Controls systemd units via `systemctl`.
pub struct SystemdController;

impl ServiceController for SystemdController {
    fn restart(&self, identity: &str) -> Result<(), ServiceError> {
        let output = run("systemctl", &["restart", identity])?;
        if !output.status.success() {
            return Err(ServiceError::Failed {
                command: format!("systemctl restart {}", identity),
                status: output.status,
            });
        }
        info!(unit = identity, "restarted systemd unit");
        Ok(())
    }

    fn is_active(&self, identity: &str) -> Result<bool, ServiceError> {
        // `is-active` exits non-zero for inactive units; that is an answer,
        // not a failure.
        let output = run("systemctl", &["is-active", "--quiet", identity])?;
        Ok(output.status.success())
    }
}

/// Controls containers via the container runtime binary (`docker` by
/// default).
pub struct ContainerController {
    runtime: String,
}

impl ContainerController {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }
}

impl Default for ContainerController {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ServiceController for ContainerController {
    fn restart(&self, identity: &str) -> Result<(), ServiceError> {
        let output = run(&self.runtime, &["restart", identity])?;
        if !output.status.success() {
            return Err(ServiceError::Failed {
                command: format!("{} restart {}", self.runtime, identity),
                status: output.status,
            });
        }
        info!(container = identity, "restarted container");
        Ok(())
    }

    fn is_active(&self, identity: &str) -> Result<bool, ServiceError> {
        let output = run(
            &self.runtime,
            &["inspect", "-f", "{{.State.Running}}", identity],
        )?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }
}
