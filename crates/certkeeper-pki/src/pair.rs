//! Certificate/key pair matching
//!
//! A certificate and an RSA private key pair up iff they share the same
//! public modulus. Comparing a digest of the canonical modulus text keeps
//! the comparison length-independent and keeps raw key material out of
//! intermediate values.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use rustls_pemfile::private_key;
use rustls_pki_types::PrivateKeyDer;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::pemutil;

/// Pair matching errors
#[derive(Debug, Error)]
pub enum PairError {
    #[error("certificate input is empty")]
    EmptyCertificate,

    #[error("private key input is empty")]
    EmptyKey,

    #[error("certificate could not be parsed: {0}")]
    InvalidCertificate(String),

    #[error("private key could not be parsed: {0}")]
    InvalidKey(String),

    #[error("unsupported {0} key type, only RSA is supported")]
    UnsupportedKeyType(&'static str),
}

/// Check whether `cert_pem` and `key_pem` are a cryptographic pair.
///
/// Both inputs are PEM documents. The result is independent of PEM
/// line-wrapping and surrounding whitespace: the fingerprint is computed
/// over the decoded modulus, not the raw bytes.
pub fn matches(cert_pem: &[u8], key_pem: &[u8]) -> Result<bool, PairError> {
    let cert_fp = certificate_fingerprint(cert_pem)?;
    let key_fp = key_fingerprint(key_pem)?;
    let matched = cert_fp == key_fp;
    debug!(matched, "compared certificate and key modulus fingerprints");
    Ok(matched)
}

/// SHA-256 fingerprint of the modulus embedded in a certificate's public key.
pub fn certificate_fingerprint(cert_pem: &[u8]) -> Result<[u8; 32], PairError> {
    if cert_pem.is_empty() {
        return Err(PairError::EmptyCertificate);
    }

    let der = pemutil::first_certificate_der(cert_pem)
        .map_err(PairError::InvalidCertificate)?
        .ok_or_else(|| PairError::InvalidCertificate("no CERTIFICATE block found".into()))?;

    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| PairError::InvalidCertificate(e.to_string()))?;

    match cert.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => Ok(modulus_fingerprint(rsa.modulus)),
        Ok(PublicKey::EC(_)) => Err(PairError::UnsupportedKeyType("EC")),
        Ok(_) => Err(PairError::UnsupportedKeyType("non-RSA")),
        Err(e) => Err(PairError::InvalidCertificate(e.to_string())),
    }
}

/// SHA-256 fingerprint of an RSA private key's public modulus.
///
/// Accepts PKCS#1 (`RSA PRIVATE KEY`) and PKCS#8 (`PRIVATE KEY`) documents.
pub fn key_fingerprint(key_pem: &[u8]) -> Result<[u8; 32], PairError> {
    if key_pem.is_empty() {
        return Err(PairError::EmptyKey);
    }

    let mut reader = key_pem;
    let key = private_key(&mut reader)
        .map_err(|e| PairError::InvalidKey(e.to_string()))?
        .ok_or_else(|| PairError::InvalidKey("no private key block found".into()))?;

    let key = match key {
        PrivateKeyDer::Pkcs1(der) => RsaPrivateKey::from_pkcs1_der(der.secret_pkcs1_der())
            .map_err(|e| PairError::InvalidKey(e.to_string()))?,
        PrivateKeyDer::Pkcs8(der) => {
            let der = der.secret_pkcs8_der();
            // PKCS#8 wraps any algorithm; reject non-RSA before decoding.
            let info = rsa::pkcs8::PrivateKeyInfo::try_from(der)
                .map_err(|e| PairError::InvalidKey(e.to_string()))?;
            if info.algorithm.oid == EC_OID {
                return Err(PairError::UnsupportedKeyType("EC"));
            }
            if info.algorithm.oid != RSA_OID {
                return Err(PairError::UnsupportedKeyType("non-RSA"));
            }
            RsaPrivateKey::from_pkcs8_der(der)
                .map_err(|e| PairError::InvalidKey(e.to_string()))?
        }
        PrivateKeyDer::Sec1(_) => return Err(PairError::UnsupportedKeyType("EC")),
        _ => return Err(PairError::UnsupportedKeyType("non-RSA")),
    };

    Ok(modulus_fingerprint(&key.n().to_bytes_be()))
}

const RSA_OID: rsa::pkcs8::ObjectIdentifier =
    rsa::pkcs8::ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_OID: rsa::pkcs8::ObjectIdentifier =
    rsa::pkcs8::ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Digest the canonical textual form of a big-endian modulus.
///
/// Leading zero bytes are stripped first so the DER INTEGER sign byte does
/// not skew the comparison between the certificate and key sides.
fn modulus_fingerprint(modulus_be: &[u8]) -> [u8; 32] {
    let start = modulus_be
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(modulus_be.len());
    let canonical = hex::encode_upper(&modulus_be[start..]);
    Sha256::digest(canonical.as_bytes()).into()
}
