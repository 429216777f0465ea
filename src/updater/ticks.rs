//! The updater's work units.
//!
//! Each tick fetches one bounded batch from the store and works through it.
//! Per-item failures are logged, counted and left for the next tick. The
//! exception is a signer that stops answering: that aborts the tick as
//! [`TickError::Unavailable`] so the loop backs off.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

use super::authority::{CertificateAuthority, OcspSigningRequest, Publisher};
use super::store::{CertificateStatus, CertificateStore, OcspStatus, StoreError};
use crate::clock::Clock;
use crate::scheduler::{TickError, WorkUnit};
use crate::telemetry::{ScopedStats, Stats};

/// State shared by all of the updater's work units.
pub struct UpdaterCore {
    pub store: Arc<dyn CertificateStore>,
    pub authority: Arc<dyn CertificateAuthority>,
    pub publisher: Arc<dyn Publisher>,
    pub clock: Arc<dyn Clock>,
    pub stats: ScopedStats,
    pub ocsp_min_time_to_expiry: Duration,
    pub oldest_issued_sct: Duration,
    pub expected_ct_logs: usize,
}

fn ago(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn query_failed(what: &str, err: StoreError) -> TickError {
    TickError::Failed(format!("{what}: {err}"))
}

impl UpdaterCore {
    /// Sign a fresh response for `status`. `revoked` forces the revoked
    /// status into the signing request.
    async fn generate_response(
        &self,
        mut status: CertificateStatus,
        revoked: bool,
    ) -> Result<CertificateStatus, TickError> {
        let cert = self
            .store
            .certificate(&status.serial)
            .await
            .map_err(|e| TickError::Failed(e.to_string()))?;

        let request = OcspSigningRequest {
            cert_der: cert.der,
            status: if revoked { OcspStatus::Revoked } else { status.status },
            reason: status.revoked_reason,
            revoked_at: status.revoked_date,
        };
        let response = self.authority.generate_ocsp(request).await.map_err(|e| {
            if e.is_unavailable() {
                TickError::Unavailable(e.to_string())
            } else {
                TickError::Failed(e.to_string())
            }
        })?;

        status.ocsp_last_updated = Some(self.clock.utc_now());
        status.ocsp_response = response;
        Ok(status)
    }

    async fn store_response(&self, status: &CertificateStatus, error_metric: &str) -> bool {
        match self.store.store_response(status).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(serial = %status.serial, "status changed underneath update, skipping");
                false
            }
            Err(e) => {
                self.stats.inc(error_metric, 1);
                tracing::error!(serial = %status.serial, error = %e, "failed to store OCSP response");
                false
            }
        }
    }

    /// Generate and store a response for each row in the batch.
    async fn generate_responses(&self, statuses: Vec<CertificateStatus>) -> Result<(), TickError> {
        for status in statuses {
            let serial = status.serial.clone();
            let updated = match self.generate_response(status, false).await {
                Ok(updated) => updated,
                Err(e) => {
                    self.stats.inc("errors.response_generation", 1);
                    tracing::error!(serial = %serial, error = %e, "failed to generate OCSP response");
                    if e.is_unavailable() {
                        return Err(e);
                    }
                    continue;
                }
            };
            self.stats.inc("generated_responses", 1);
            if self.store_response(&updated, "errors.store_response").await {
                self.stats.inc("stored_responses", 1);
            }
        }
        Ok(())
    }
}

/// Certificates that have never had a response.
pub struct NewCertificates(pub Arc<UpdaterCore>);

#[async_trait::async_trait]
impl WorkUnit for NewCertificates {
    async fn run(&self, batch_size: usize) -> Result<(), TickError> {
        let core = &self.0;
        let statuses = match core.store.certificates_missing_responses(batch_size).await {
            Ok(s) => s,
            Err(e) => {
                core.stats.inc("errors.find_missing_responses", 1);
                tracing::error!(error = %e, "failed to find certificates with missing OCSP responses");
                return Err(query_failed("find missing responses", e));
            }
        };
        core.generate_responses(statuses).await
    }
}

/// Responses older than the refresh threshold.
pub struct OldOcspResponses(pub Arc<UpdaterCore>);

#[async_trait::async_trait]
impl WorkUnit for OldOcspResponses {
    async fn run(&self, batch_size: usize) -> Result<(), TickError> {
        let core = &self.0;
        let now = core.clock.utc_now();
        let cutoff = ago(now, core.ocsp_min_time_to_expiry);
        let statuses = match core.store.stale_responses(cutoff, now, batch_size).await {
            Ok(s) => s,
            Err(e) => {
                core.stats.inc("errors.find_stale_responses", 1);
                tracing::error!(error = %e, "failed to find stale OCSP responses");
                return Err(query_failed("find stale responses", e));
            }
        };
        core.generate_responses(statuses).await
    }
}

/// Revoked certificates still serving a pre-revocation response.
pub struct RevokedCertificates(pub Arc<UpdaterCore>);

#[async_trait::async_trait]
impl WorkUnit for RevokedCertificates {
    async fn run(&self, batch_size: usize) -> Result<(), TickError> {
        let core = &self.0;
        let statuses = match core.store.revoked_needing_update(batch_size).await {
            Ok(s) => s,
            Err(e) => {
                core.stats.inc("errors.find_revoked_certificates", 1);
                tracing::error!(error = %e, "failed to find revoked certificates");
                return Err(query_failed("find revoked certificates", e));
            }
        };

        for status in statuses {
            let serial = status.serial.clone();
            let updated = match core.generate_response(status, true).await {
                Ok(updated) => updated,
                Err(e) => {
                    core.stats.inc("errors.revoked_response_generation", 1);
                    tracing::error!(serial = %serial, error = %e, "failed to generate revoked OCSP response");
                    if e.is_unavailable() {
                        return Err(e);
                    }
                    continue;
                }
            };
            if core.store_response(&updated, "errors.store_revoked_response").await {
                core.stats.inc("stored_revoked_responses", 1);
            }
        }
        Ok(())
    }
}

/// Recently issued certificates missing CT receipts.
pub struct MissingSctReceipts(pub Arc<UpdaterCore>);

#[async_trait::async_trait]
impl WorkUnit for MissingSctReceipts {
    async fn run(&self, batch_size: usize) -> Result<(), TickError> {
        let core = &self.0;
        let since = ago(core.clock.utc_now(), core.oldest_issued_sct);
        let serials = match core.store.serials_issued_since(since, batch_size).await {
            Ok(s) => s,
            Err(e) => {
                core.stats.inc("errors.find_issued_serials", 1);
                tracing::error!(error = %e, "failed to get certificate serials");
                return Err(query_failed("find issued serials", e));
            }
        };

        for serial in serials {
            let count = match core.store.receipt_count(&serial).await {
                Ok(c) => c,
                Err(e) => {
                    core.stats.inc("errors.receipt_count", 1);
                    tracing::error!(serial = %serial, error = %e, "failed to count SCT receipts");
                    continue;
                }
            };
            if count == core.expected_ct_logs {
                continue;
            }
            let cert = match core.store.certificate(&serial).await {
                Ok(c) => c,
                Err(e) => {
                    core.stats.inc("errors.get_certificate", 1);
                    tracing::error!(serial = %serial, error = %e, "failed to get certificate");
                    continue;
                }
            };
            match core.publisher.submit_to_ct(&cert.der).await {
                Ok(()) => core.stats.inc("submitted_to_ct", 1),
                Err(e) => {
                    core.stats.inc("errors.submit_to_ct", 1);
                    tracing::error!(serial = %serial, error = %e, "failed to submit certificate to CT logs");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "ticks_tests.rs"]
mod tests;
