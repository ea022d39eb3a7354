//! Certificate expiry classification

use chrono::{DateTime, Utc};
use thiserror::Error;
use x509_parser::prelude::*;

use crate::pemutil;

#[derive(Debug, Error)]
pub enum ExpiryError {
    #[error("certificate could not be parsed: {0}")]
    InvalidCertificate(String),

    #[error("certificate expiry timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
}

/// Urgency tier derived from remaining validity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UrgencyTier {
    Safe,
    Warning,
    Critical,
}

impl std::fmt::Display for UrgencyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrgencyTier::Safe => write!(f, "SAFE"),
            UrgencyTier::Warning => write!(f, "WARNING"),
            UrgencyTier::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Tier thresholds in whole days, supplied per service.
///
/// `days > safe_over` is Safe, `days > warn_over` is Warning, anything
/// else (including negative, i.e. already expired) is Critical.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub safe_over: i64,
    pub warn_over: i64,
}

impl Thresholds {
    pub const fn new(safe_over: i64, warn_over: i64) -> Self {
        Self {
            safe_over,
            warn_over,
        }
    }

    pub fn tier(&self, days_remaining: i64) -> UrgencyTier {
        if days_remaining > self.safe_over {
            UrgencyTier::Safe
        } else if days_remaining > self.warn_over {
            UrgencyTier::Warning
        } else {
            UrgencyTier::Critical
        }
    }
}

/// Remaining validity of a certificate at a given instant
#[derive(Debug, Clone, Copy)]
pub struct ExpiryStatus {
    pub not_after: DateTime<Utc>,
    pub days_remaining: i64,
    pub tier: UrgencyTier,
}

/// Parse the certificate's not-after field and classify remaining validity.
///
/// `days_remaining` truncates toward zero: a certificate expiring in 47
/// hours has 1 day remaining.
pub fn classify(
    cert_pem: &[u8],
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Result<ExpiryStatus, ExpiryError> {
    let der = pemutil::first_certificate_der(cert_pem)
        .map_err(ExpiryError::InvalidCertificate)?
        .ok_or_else(|| ExpiryError::InvalidCertificate("no CERTIFICATE block found".into()))?;

    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| ExpiryError::InvalidCertificate(e.to_string()))?;

    let expiry_ts = cert.validity().not_after.timestamp();
    let not_after = DateTime::<Utc>::from_timestamp(expiry_ts, 0)
        .ok_or(ExpiryError::TimestampOutOfRange(expiry_ts))?;

    let days_remaining = (expiry_ts - now.timestamp()) / 86_400;

    Ok(ExpiryStatus {
        not_after,
        days_remaining,
        tier: thresholds.tier(days_remaining),
    })
}
