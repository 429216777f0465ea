//! Certificate status storage consulted by the updater loops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Revocation status of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcspStatus {
    Good,
    Revoked,
}

/// An issued certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub serial: String,
    pub der: Vec<u8>,
    pub issued: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Status row for one certificate, including its latest OCSP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateStatus {
    pub serial: String,
    pub status: OcspStatus,
    /// None until a response has been generated.
    pub ocsp_last_updated: Option<DateTime<Utc>>,
    pub ocsp_response: Vec<u8>,
    pub revoked_date: Option<DateTime<Utc>>,
    pub revoked_reason: u8,
}

impl CertificateStatus {
    /// A fresh status row with no response.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            status: OcspStatus::Good,
            ocsp_last_updated: None,
            ocsp_response: Vec::new(),
            revoked_date: None,
            revoked_reason: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no certificate with serial {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Batch queries and the conditional response update.
///
/// Every batch query returns at most `limit` rows.
#[async_trait::async_trait]
pub trait CertificateStore: Send + Sync {
    /// Status rows that have never had a response generated.
    async fn certificates_missing_responses(
        &self,
        limit: usize,
    ) -> Result<Vec<CertificateStatus>, StoreError>;

    /// Rows whose response was last updated before `updated_before`, for
    /// certificates that have not expired at `now`. Oldest first.
    async fn stale_responses(
        &self,
        updated_before: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CertificateStatus>, StoreError>;

    /// Revoked rows whose response does not postdate the revocation.
    async fn revoked_needing_update(
        &self,
        limit: usize,
    ) -> Result<Vec<CertificateStatus>, StoreError>;

    /// Serials of certificates issued after `since`, oldest first.
    async fn serials_issued_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    async fn receipt_count(&self, serial: &str) -> Result<usize, StoreError>;

    async fn certificate(&self, serial: &str) -> Result<Certificate, StoreError>;

    /// Write the response and its timestamp, but only if the stored status
    /// still equals `status.status`. Returns whether a row was updated.
    async fn store_response(&self, status: &CertificateStatus) -> Result<bool, StoreError>;
}
