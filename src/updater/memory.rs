//! In-process [`CertificateStore`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::store::{Certificate, CertificateStatus, CertificateStore, OcspStatus, StoreError};

#[derive(Default)]
struct Tables {
    certificates: BTreeMap<String, Certificate>,
    statuses: BTreeMap<String, CertificateStatus>,
    receipts: HashMap<String, usize>,
    offline: bool,
}

/// Certificate store held in memory, ordered by serial.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an issued certificate with a fresh status row.
    pub fn insert(&self, cert: Certificate) {
        let mut t = self.tables.write();
        t.statuses
            .insert(cert.serial.clone(), CertificateStatus::new(cert.serial.clone()));
        t.certificates.insert(cert.serial.clone(), cert);
    }

    /// Replace a status row outright.
    pub fn put_status(&self, status: CertificateStatus) {
        self.tables.write().statuses.insert(status.serial.clone(), status);
    }

    pub fn status(&self, serial: &str) -> Option<CertificateStatus> {
        self.tables.read().statuses.get(serial).cloned()
    }

    pub fn revoke(&self, serial: &str, at: DateTime<Utc>, reason: u8) -> bool {
        let mut t = self.tables.write();
        match t.statuses.get_mut(serial) {
            Some(s) => {
                s.status = OcspStatus::Revoked;
                s.revoked_date = Some(at);
                s.revoked_reason = reason;
                true
            }
            None => false,
        }
    }

    pub fn add_receipts(&self, serial: &str, count: usize) {
        *self.tables.write().receipts.entry(serial.to_owned()).or_default() += count;
    }

    /// While offline every call fails with [`StoreError::Backend`].
    pub fn set_offline(&self, offline: bool) {
        self.tables.write().offline = offline;
    }

    fn check_online(t: &Tables) -> Result<(), StoreError> {
        if t.offline {
            return Err(StoreError::Backend("store offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CertificateStore for MemoryStore {
    async fn certificates_missing_responses(
        &self,
        limit: usize,
    ) -> Result<Vec<CertificateStatus>, StoreError> {
        let t = self.tables.read();
        Self::check_online(&t)?;
        Ok(t.statuses
            .values()
            .filter(|s| s.ocsp_last_updated.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stale_responses(
        &self,
        updated_before: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CertificateStatus>, StoreError> {
        let t = self.tables.read();
        Self::check_online(&t)?;
        let mut stale: Vec<_> = t
            .statuses
            .values()
            .filter(|s| matches!(s.ocsp_last_updated, Some(at) if at < updated_before))
            .filter(|s| t.certificates.get(&s.serial).is_some_and(|c| c.expires > now))
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.ocsp_last_updated);
        stale.truncate(limit);
        Ok(stale)
    }

    async fn revoked_needing_update(
        &self,
        limit: usize,
    ) -> Result<Vec<CertificateStatus>, StoreError> {
        let t = self.tables.read();
        Self::check_online(&t)?;
        Ok(t.statuses
            .values()
            .filter(|s| s.status == OcspStatus::Revoked)
            .filter(|s| match (s.ocsp_last_updated, s.revoked_date) {
                (None, _) => true,
                (Some(updated), Some(revoked)) => updated <= revoked,
                (Some(_), None) => false,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn serials_issued_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let t = self.tables.read();
        Self::check_online(&t)?;
        let mut issued: Vec<_> = t.certificates.values().filter(|c| c.issued > since).collect();
        issued.sort_by_key(|c| c.issued);
        Ok(issued.into_iter().take(limit).map(|c| c.serial.clone()).collect())
    }

    async fn receipt_count(&self, serial: &str) -> Result<usize, StoreError> {
        let t = self.tables.read();
        Self::check_online(&t)?;
        Ok(t.receipts.get(serial).copied().unwrap_or(0))
    }

    async fn certificate(&self, serial: &str) -> Result<Certificate, StoreError> {
        let t = self.tables.read();
        Self::check_online(&t)?;
        t.certificates
            .get(serial)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(serial.to_owned()))
    }

    async fn store_response(&self, status: &CertificateStatus) -> Result<bool, StoreError> {
        let mut t = self.tables.write();
        Self::check_online(&t)?;
        match t.statuses.get_mut(&status.serial) {
            Some(row) if row.status == status.status => {
                row.ocsp_response = status.ocsp_response.clone();
                row.ocsp_last_updated = status.ocsp_last_updated;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
