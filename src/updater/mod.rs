//! OCSP updater: keeps certificate status responses fresh.
//!
//! Four loops share one [`UpdaterCore`]:
//!
//! - `new_certificates` signs a first response for new certificates.
//! - `old_ocsp_responses` re-signs responses past their refresh age.
//! - `missing_sct_receipts` resubmits certificates lacking CT receipts.
//! - `revoked_certificates` re-signs revoked certificates. It runs only when
//!   both its batch size and window are configured.
//!
//! Every loop except `missing_sct_receipts` backs off while the signer is
//! unavailable.

mod authority;
mod memory;
mod store;
mod ticks;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub use authority::{
    AuthorityError, CertificateAuthority, GenerateOcspReply, OcspSigningRequest, PublishError,
    Publisher, RpcAuthority,
};
pub use memory::MemoryStore;
pub use store::{Certificate, CertificateStatus, CertificateStore, OcspStatus, StoreError};
pub use ticks::{MissingSctReceipts, NewCertificates, OldOcspResponses, RevokedCertificates, UpdaterCore};

use crate::config::UpdaterConfig;
use crate::context::ServiceContext;
use crate::scheduler::{BackoffPolicy, LoopStatus, Looper, LooperConfig, SchedulerError, WorkUnit};
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::ScopedStats;

fn build_loop(
    stats: &ScopedStats,
    name: &str,
    batch_size: usize,
    tick_window: Duration,
    backoff: BackoffPolicy,
    work: Arc<dyn WorkUnit>,
) -> Result<Looper, SchedulerError> {
    let config = LooperConfig {
        name: name.to_owned(),
        batch_size,
        tick_window,
        backoff,
    };
    Looper::new(config, work, stats)
}

/// The set of updater loops, built and ready to spawn.
pub struct OcspUpdater {
    loopers: Vec<Looper>,
}

impl std::fmt::Debug for OcspUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcspUpdater")
            .field("loops", &self.loop_names())
            .finish()
    }
}

impl OcspUpdater {
    /// Build the loops. A zero batch size or window on any of the three
    /// required loops is a configuration error.
    pub fn new(
        config: &UpdaterConfig,
        ctx: &ServiceContext,
        store: Arc<dyn CertificateStore>,
        authority: Arc<dyn CertificateAuthority>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, SchedulerError> {
        let stats = ScopedStats::new(Arc::clone(&ctx.stats), &["ocsp"]);
        let core = Arc::new(UpdaterCore {
            store,
            authority,
            publisher,
            clock: Arc::clone(&ctx.clock),
            stats: stats.clone(),
            ocsp_min_time_to_expiry: config.ocsp_min_time_to_expiry,
            oldest_issued_sct: config.oldest_issued_sct,
            expected_ct_logs: config.expected_ct_logs,
        });
        let backoff =
            BackoffPolicy::new(config.sign_failure_backoff_factor, config.sign_failure_backoff_max);

        let mut loopers = vec![
            build_loop(
                &stats,
                "new_certificates",
                config.new_certificate_batch_size,
                config.new_certificate_window,
                backoff,
                Arc::new(NewCertificates(Arc::clone(&core))),
            )?,
            build_loop(
                &stats,
                "old_ocsp_responses",
                config.old_ocsp_batch_size,
                config.old_ocsp_window,
                backoff,
                Arc::new(OldOcspResponses(Arc::clone(&core))),
            )?,
            build_loop(
                &stats,
                "missing_sct_receipts",
                config.missing_sct_batch_size,
                config.missing_sct_window,
                BackoffPolicy::DISABLED,
                Arc::new(MissingSctReceipts(Arc::clone(&core))),
            )?,
        ];

        if config.revoked_certificate_batch_size != 0 && !config.revoked_certificate_window.is_zero()
        {
            loopers.push(build_loop(
                &stats,
                "revoked_certificates",
                config.revoked_certificate_batch_size,
                config.revoked_certificate_window,
                backoff,
                Arc::new(RevokedCertificates(core)),
            )?);
        } else {
            tracing::info!("revoked_certificates loop not configured, skipping");
        }

        Ok(Self { loopers })
    }

    pub fn loop_names(&self) -> Vec<&str> {
        self.loopers.iter().map(Looper::name).collect()
    }

    /// Live status handles, one per loop.
    pub fn statuses(&self) -> Vec<LoopStatus> {
        self.loopers.iter().map(Looper::status).collect()
    }

    /// Run one tick of every loop in order, ignoring cadence.
    pub async fn tick_all(&mut self) {
        for looper in &mut self.loopers {
            looper.tick().await;
        }
    }

    /// Start one task per loop. They stop when `shutdown` is initiated.
    pub fn spawn(self, shutdown: Arc<ShutdownCoordinator>) -> Vec<JoinHandle<()>> {
        self.loopers
            .into_iter()
            .map(|looper| looper.spawn(Arc::clone(&shutdown)))
            .collect()
    }
}
