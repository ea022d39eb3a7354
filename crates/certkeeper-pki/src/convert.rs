//! Encoding normalization
//!
//! The container console only accepts PEM material. Sourced files that are
//! already PEM pass through untouched; DER files are validated and
//! re-encoded into a staging location.

use std::fs;
use std::path::{Path, PathBuf};

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use thiserror::Error;
use tracing::info;
use x509_parser::prelude::*;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{path}: {kind} is not valid PEM or DER: {detail}")]
    Malformed {
        path: PathBuf,
        kind: &'static str,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a sourced file is expected to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Certificate,
    PrivateKey,
}

impl MaterialKind {
    fn pem_tag(self) -> &'static str {
        match self {
            MaterialKind::Certificate => "CERTIFICATE",
            MaterialKind::PrivateKey => "PRIVATE KEY",
        }
    }

    fn label(self) -> &'static str {
        match self {
            MaterialKind::Certificate => "certificate",
            MaterialKind::PrivateKey => "private key",
        }
    }
}

/// Ensure `path` holds PEM-encoded material, converting into `staging_dir`
/// when it does not.
///
/// Files whose extension is already `pem` are returned unchanged. Anything
/// else is staged under a canonical `.pem` name, overwriting a previous
/// staging run.
pub fn normalize(
    path: &Path,
    kind: MaterialKind,
    staging_dir: &Path,
) -> Result<PathBuf, ConvertError> {
    let already_pem = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pem"))
        .unwrap_or(false);
    if already_pem {
        return Ok(path.to_path_buf());
    }

    let bytes = fs::read(path)?;
    let pem_bytes = if looks_like_pem(&bytes) {
        // Right encoding, wrong extension. Stage a copy under the
        // canonical name instead of rewriting the source file.
        bytes
    } else {
        let der = validate_der(path, kind, &bytes)?;
        ::pem::encode(&::pem::Pem::new(kind.pem_tag(), der)).into_bytes()
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("staged");
    fs::create_dir_all(staging_dir)?;
    // Keys get a distinct staged name so a certificate and key sharing a
    // stem never collide in the staging directory.
    let staged = match kind {
        MaterialKind::Certificate => staging_dir.join(format!("{}.pem", stem)),
        MaterialKind::PrivateKey => staging_dir.join(format!("{}.key.pem", stem)),
    };
    fs::write(&staged, pem_bytes)?;
    info!(from = %path.display(), to = %staged.display(), "normalized {} to PEM", kind.label());
    Ok(staged)
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|i| bytes[i..].starts_with(b"-----BEGIN"))
        .unwrap_or(false)
}

/// Parse the DER to prove it is the claimed kind before re-encoding.
fn validate_der(path: &Path, kind: MaterialKind, der: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let malformed = |detail: String| ConvertError::Malformed {
        path: path.to_path_buf(),
        kind: kind.label(),
        detail,
    };

    match kind {
        MaterialKind::Certificate => {
            X509Certificate::from_der(der).map_err(|e| malformed(e.to_string()))?;
        }
        MaterialKind::PrivateKey => {
            RsaPrivateKey::from_pkcs8_der(der)
                .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
                .map_err(|e| malformed(e.to_string()))?;
        }
    }
    Ok(der.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(format!(
            "{}/tests/fixtures/{}",
            env!("CARGO_MANIFEST_DIR"),
            name
        ))
    }

    #[test]
    fn pem_extension_passes_through() {
        let staging = TempDir::new().unwrap();
        let src = staging.path().join("server.pem");
        std::fs::copy(fixture_path("server.crt"), &src).unwrap();

        let out = normalize(&src, MaterialKind::Certificate, staging.path()).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn der_certificate_is_converted() {
        let staging = TempDir::new().unwrap();
        let out = normalize(
            &fixture_path("server.der"),
            MaterialKind::Certificate,
            staging.path(),
        )
        .unwrap();

        assert_eq!(out, staging.path().join("server.pem"));
        let converted = std::fs::read(&out).unwrap();
        // Converted output must describe the same certificate.
        let orig_fp = crate::pair::certificate_fingerprint(&std::fs::read(fixture_path(
            "server.crt",
        ))
        .unwrap())
        .unwrap();
        let conv_fp = crate::pair::certificate_fingerprint(&converted).unwrap();
        assert_eq!(orig_fp, conv_fp);
    }

    #[test]
    fn pem_content_with_foreign_extension_is_staged() {
        let staging = TempDir::new().unwrap();
        let src = staging.path().join("console.crt");
        std::fs::copy(fixture_path("server.crt"), &src).unwrap();

        let out = normalize(&src, MaterialKind::Certificate, staging.path()).unwrap();
        assert_eq!(out, staging.path().join("console.pem"));
        assert_eq!(std::fs::read(out).unwrap(), std::fs::read(src).unwrap());
    }

    #[test]
    fn key_stages_under_a_distinct_name() {
        let staging = TempDir::new().unwrap();
        let src = staging.path().join("console.key");
        std::fs::copy(fixture_path("server.key"), &src).unwrap();

        let out = normalize(&src, MaterialKind::PrivateKey, staging.path()).unwrap();
        assert_eq!(out, staging.path().join("console.key.pem"));
    }

    #[test]
    fn restaging_overwrites_previous_output() {
        let staging = TempDir::new().unwrap();
        let prior = staging.path().join("server.pem");
        std::fs::write(&prior, b"stale").unwrap();

        let out = normalize(
            &fixture_path("server.der"),
            MaterialKind::Certificate,
            staging.path(),
        )
        .unwrap();
        assert_eq!(out, prior);
        assert_ne!(std::fs::read(out).unwrap(), b"stale");
    }

    #[test]
    fn garbage_der_fails() {
        let staging = TempDir::new().unwrap();
        let src = staging.path().join("junk.der");
        std::fs::write(&src, [0u8; 64]).unwrap();

        let err = normalize(&src, MaterialKind::Certificate, staging.path()).unwrap_err();
        assert!(matches!(err, ConvertError::Malformed { .. }));
    }
}
