//! Certificate and key inspection for certkeeper
//!
//! Proves that a certificate and a private key form a pair, classifies
//! remaining validity into urgency tiers, and normalizes DER-encoded
//! material to PEM before installation.

pub mod convert;
pub mod expiry;
pub mod pair;

pub use convert::{normalize, ConvertError, MaterialKind};
pub use expiry::{classify, ExpiryError, ExpiryStatus, Thresholds, UrgencyTier};
pub use pair::{matches, PairError};

pub(crate) mod pemutil {
    /// Decode the first CERTIFICATE block of a PEM document to DER.
    ///
    /// Returns `None` when the input contains no certificate block at all;
    /// a present-but-corrupt block is an error.
    pub(crate) fn first_certificate_der(pem: &[u8]) -> Result<Option<Vec<u8>>, String> {
        let mut reader = pem;
        let result = match rustls_pemfile::certs(&mut reader).next() {
            Some(Ok(der)) => Ok(Some(der.as_ref().to_vec())),
            Some(Err(e)) => Err(e.to_string()),
            None => Ok(None),
        };
        result
    }
}
