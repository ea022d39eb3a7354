//! Replacement material sourcing for certkeeper
//!
//! Produces a candidate certificate/key pair either from a local directory
//! of operator-provided files or from the remote certificate API.

pub mod local;
pub mod remote;
pub mod store;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use local::{find_candidates, select_indexed, LocalSource, SelectKind};
pub use remote::{
    is_valid_cert_name, is_valid_server, is_valid_token, FetchProfile, RemoteCredentials,
    RemoteEndpoint, RemoteSource,
};
pub use store::CredentialStore;

/// Sourcing errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no candidate {what} files found in {dir}")]
    NotFound { what: &'static str, dir: PathBuf },

    #[error("selection {index} is out of range, expected 1..={count}")]
    Selection { index: usize, count: usize },

    #[error("remote returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("remote request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote bundle is not valid PEM: {0}")]
    InvalidBundle(String),

    #[error("remote bundle is missing a {0} block")]
    MissingBlock(&'static str),

    #[error("certificate name {0:?} contains characters outside [A-Za-z0-9._-]")]
    InvalidCertName(String),

    #[error("remote server address must not be empty")]
    EmptyServer,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A certificate/key pair at rest, ready for validation and installation.
///
/// The bytes are what sourcing produced; the paths are where that material
/// now lives on local disk (installation copies from them, never moves).
#[derive(Debug, Clone)]
pub struct CertificateMaterial {
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// A strategy that yields replacement certificate material.
#[async_trait]
pub trait MaterialSource {
    async fn resolve(&self) -> Result<CertificateMaterial, SourceError>;
}
