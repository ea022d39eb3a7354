//! Remote certificate API sourcing
//!
//! Fetches named certificate material over HTTPS with bearer-token auth and
//! writes it into the staging directory. The endpoint is built from explicit
//! fields and the certificate name is charset-checked before it ever reaches
//! a URL.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{CertificateMaterial, MaterialSource, SourceError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Validated inputs for remote sourcing.
///
/// Captured interactively by the CLI (which retries against the predicates
/// below) or loaded from the credential store; by the time a value lands
/// here it is already valid.
#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    pub server: String,
    pub token: String,
    pub cert_name: String,
}

/// Bearer tokens shorter than 20 characters are rejected as truncated
/// paste errors.
pub fn is_valid_token(s: &str) -> bool {
    s.trim().len() >= 20
}

pub fn is_valid_server(s: &str) -> bool {
    !s.trim().is_empty()
}

pub fn is_valid_cert_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Certificate API endpoint built from explicit fields.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    server: String,
    cert_name: String,
}

impl RemoteEndpoint {
    pub fn new(server: &str, cert_name: &str) -> Result<Self, SourceError> {
        let server = server.trim();
        if server.is_empty() {
            return Err(SourceError::EmptyServer);
        }
        if !is_valid_cert_name(cert_name) {
            return Err(SourceError::InvalidCertName(cert_name.to_string()));
        }

        let mut server = server.trim_end_matches('/').to_string();
        if !server.starts_with("http://") && !server.starts_with("https://") {
            server = format!("https://{}", server);
        }

        Ok(Self {
            server,
            cert_name: cert_name.to_string(),
        })
    }

    pub fn certificate_url(&self) -> String {
        format!("{}/api/v1.0/certificates/{}", self.server, self.cert_name)
    }

    pub fn key_url(&self) -> String {
        format!("{}/key", self.certificate_url())
    }

    pub fn cert_name(&self) -> &str {
        &self.cert_name
    }
}

/// How the remote API hands out the private key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProfile {
    /// Certificate and key live at separate endpoints.
    Split,
    /// One endpoint returns a PEM bundle holding both.
    Combined,
}

/// Sources certificate material from the remote API.
pub struct RemoteSource {
    endpoint: RemoteEndpoint,
    token: String,
    profile: FetchProfile,
    staging_dir: PathBuf,
    client: reqwest::Client,
}

impl RemoteSource {
    pub fn new(
        credentials: &RemoteCredentials,
        profile: FetchProfile,
        staging_dir: impl Into<PathBuf>,
    ) -> Result<Self, SourceError> {
        let endpoint = RemoteEndpoint::new(&credentials.server, &credentials.cert_name)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            endpoint,
            token: credentials.token.clone(),
            profile,
            staging_dir: staging_dir.into(),
            client,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        debug!(url, "fetching from certificate API");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Liveness check: repeat the certificate fetch and require HTTP 200.
    pub async fn verify_reachable(&self) -> Result<(), SourceError> {
        self.fetch(&self.endpoint.certificate_url()).await.map(|_| ())
    }
}

#[async_trait]
impl MaterialSource for RemoteSource {
    async fn resolve(&self) -> Result<CertificateMaterial, SourceError> {
        let (certificate, key) = match self.profile {
            FetchProfile::Split => {
                let certificate = self.fetch(&self.endpoint.certificate_url()).await?;
                let key = self.fetch(&self.endpoint.key_url()).await?;
                (certificate, key)
            }
            FetchProfile::Combined => {
                let bundle = self.fetch(&self.endpoint.certificate_url()).await?;
                split_bundle(&bundle)?
            }
        };

        std::fs::create_dir_all(&self.staging_dir)?;
        let cert_path = self
            .staging_dir
            .join(format!("{}.pem", self.endpoint.cert_name()));
        let key_path = self
            .staging_dir
            .join(format!("{}.key", self.endpoint.cert_name()));
        std::fs::write(&cert_path, &certificate)?;
        std::fs::write(&key_path, &key)?;
        info!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            "staged remote certificate material"
        );

        Ok(CertificateMaterial {
            certificate,
            key,
            cert_path,
            key_path,
        })
    }
}

/// Split a combined PEM bundle into its certificate chain and private key.
pub fn split_bundle(bundle: &[u8]) -> Result<(Vec<u8>, Vec<u8>), SourceError> {
    let blocks =
        pem::parse_many(bundle).map_err(|e| SourceError::InvalidBundle(e.to_string()))?;

    let mut certificate = String::new();
    let mut key = String::new();
    for block in &blocks {
        if block.tag() == "CERTIFICATE" {
            certificate.push_str(&pem::encode(block));
        } else if block.tag().ends_with("PRIVATE KEY") {
            key.push_str(&pem::encode(block));
        }
    }

    if certificate.is_empty() {
        return Err(SourceError::MissingBlock("CERTIFICATE"));
    }
    if key.is_empty() {
        return Err(SourceError::MissingBlock("PRIVATE KEY"));
    }
    Ok((certificate.into_bytes(), key.into_bytes()))
}
