use std::collections::VecDeque;

use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;

use super::*;
use crate::clock::FakeClock;
use crate::telemetry::MetricsStore;
use crate::updater::authority::{AuthorityError, PublishError};
use crate::updater::memory::MemoryStore;
use crate::updater::store::Certificate;

#[derive(Clone, Copy)]
enum Sign {
    Ok,
    Unavailable,
    Reject,
}

/// Authority that replays a script, then signs everything.
#[derive(Default)]
struct ScriptedAuthority {
    script: Mutex<VecDeque<Sign>>,
    requests: Mutex<Vec<OcspSigningRequest>>,
}

impl ScriptedAuthority {
    fn with_script(steps: &[Sign]) -> Self {
        Self {
            script: Mutex::new(steps.iter().copied().collect()),
            requests: Mutex::default(),
        }
    }
}

#[async_trait::async_trait]
impl CertificateAuthority for ScriptedAuthority {
    async fn generate_ocsp(&self, request: OcspSigningRequest) -> Result<Vec<u8>, AuthorityError> {
        let step = self.script.lock().pop_front().unwrap_or(Sign::Ok);
        let der = request.cert_der.clone();
        self.requests.lock().push(request);
        match step {
            Sign::Ok => Ok([b"ocsp:".as_slice(), der.as_slice()].concat()),
            Sign::Unavailable => Err(AuthorityError::Unavailable("signer timed out".into())),
            Sign::Reject => Err(AuthorityError::Rejected("malformed certificate".into())),
        }
    }
}

#[derive(Default)]
struct RecordingPublisher {
    submitted: Mutex<Vec<Vec<u8>>>,
    fail: bool,
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn submit_to_ct(&self, der: &[u8]) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Submission("log rejected chain".into()));
        }
        self.submitted.lock().push(der.to_vec());
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    authority: Arc<ScriptedAuthority>,
    publisher: Arc<RecordingPublisher>,
    clock: Arc<FakeClock>,
    metrics: Arc<MetricsStore>,
    core: Arc<UpdaterCore>,
}

fn harness(authority: ScriptedAuthority, publisher: RecordingPublisher) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let authority = Arc::new(authority);
    let publisher = Arc::new(publisher);
    let clock = FakeClock::shared();
    let metrics = Arc::new(MetricsStore::new());
    let core = Arc::new(UpdaterCore {
        store: store.clone(),
        authority: authority.clone(),
        publisher: publisher.clone(),
        clock: clock.clone(),
        stats: ScopedStats::new(metrics.clone(), &["ocsp"]),
        ocsp_min_time_to_expiry: Duration::from_secs(72 * 3600),
        oldest_issued_sct: Duration::from_secs(72 * 3600),
        expected_ct_logs: 2,
    });
    Harness { store, authority, publisher, clock, metrics, core }
}

fn issue(h: &Harness, serial: &str, age: ChronoDuration) {
    let issued = h.clock.utc_now() - age;
    h.store.insert(Certificate {
        serial: serial.into(),
        der: serial.as_bytes().to_vec(),
        issued,
        expires: issued + ChronoDuration::days(90),
    });
}

#[tokio::test]
async fn new_certificates_get_responses() {
    let h = harness(ScriptedAuthority::default(), RecordingPublisher::default());
    issue(&h, "aa", ChronoDuration::hours(1));
    issue(&h, "bb", ChronoDuration::hours(1));

    NewCertificates(h.core.clone()).run(10).await.expect("tick succeeds");

    let now = h.clock.utc_now();
    for serial in ["aa", "bb"] {
        let status = h.store.status(serial).unwrap();
        assert_eq!(status.ocsp_last_updated, Some(now));
        assert_eq!(status.ocsp_response, [b"ocsp:".as_slice(), serial.as_bytes()].concat());
    }
    assert_eq!(h.metrics.counter("ocsp.generated_responses"), 2);
    assert_eq!(h.metrics.counter("ocsp.stored_responses"), 2);
}

#[tokio::test]
async fn new_certificates_honours_batch_size() {
    let h = harness(ScriptedAuthority::default(), RecordingPublisher::default());
    for i in 0..5 {
        issue(&h, &format!("{i:02}"), ChronoDuration::hours(1));
    }
    NewCertificates(h.core.clone()).run(2).await.unwrap();
    assert_eq!(h.authority.requests.lock().len(), 2);
}

#[tokio::test]
async fn unavailable_signer_aborts_the_tick() {
    let h = harness(
        ScriptedAuthority::with_script(&[Sign::Ok, Sign::Unavailable]),
        RecordingPublisher::default(),
    );
    for serial in ["a", "b", "c"] {
        issue(&h, serial, ChronoDuration::hours(1));
    }

    let err = NewCertificates(h.core.clone()).run(10).await.unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(h.authority.requests.lock().len(), 2, "third row is never attempted");
    assert!(h.store.status("a").unwrap().ocsp_last_updated.is_some());
    assert!(h.store.status("c").unwrap().ocsp_last_updated.is_none());
    assert_eq!(h.metrics.counter("ocsp.errors.response_generation"), 1);
}

#[tokio::test]
async fn rejected_item_is_skipped_and_tick_continues() {
    let h = harness(
        ScriptedAuthority::with_script(&[Sign::Reject]),
        RecordingPublisher::default(),
    );
    issue(&h, "a", ChronoDuration::hours(1));
    issue(&h, "b", ChronoDuration::hours(1));

    NewCertificates(h.core.clone()).run(10).await.expect("per-item errors do not fail the tick");
    assert!(h.store.status("a").unwrap().ocsp_last_updated.is_none());
    assert!(h.store.status("b").unwrap().ocsp_last_updated.is_some());
    assert_eq!(h.metrics.counter("ocsp.errors.response_generation"), 1);
}

#[tokio::test]
async fn store_outage_fails_the_tick_without_backoff_class() {
    let h = harness(ScriptedAuthority::default(), RecordingPublisher::default());
    h.store.set_offline(true);
    let err = NewCertificates(h.core.clone()).run(10).await.unwrap_err();
    assert!(!err.is_unavailable());
    assert_eq!(h.metrics.counter("ocsp.errors.find_missing_responses"), 1);
}

#[tokio::test]
async fn old_responses_are_refreshed() {
    let h = harness(ScriptedAuthority::default(), RecordingPublisher::default());
    issue(&h, "old", ChronoDuration::days(10));
    issue(&h, "fresh", ChronoDuration::days(1));
    NewCertificates(h.core.clone()).run(10).await.unwrap();

    // Age "old" past the refresh threshold only.
    let mut old = h.store.status("old").unwrap();
    old.ocsp_last_updated = Some(h.clock.utc_now() - ChronoDuration::hours(100));
    h.store.put_status(old);
    h.authority.requests.lock().clear();

    OldOcspResponses(h.core.clone()).run(10).await.unwrap();

    let requests = h.authority.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].cert_der, b"old".to_vec());
    assert_eq!(h.store.status("old").unwrap().ocsp_last_updated, Some(h.clock.utc_now()));
}

#[tokio::test]
async fn revoked_certificates_get_revoked_responses() {
    let h = harness(ScriptedAuthority::default(), RecordingPublisher::default());
    issue(&h, "r", ChronoDuration::days(2));
    NewCertificates(h.core.clone()).run(10).await.unwrap();
    h.clock.advance(Duration::from_secs(60));
    assert!(h.store.revoke("r", h.clock.utc_now(), 4));
    h.clock.advance(Duration::from_secs(60));
    h.authority.requests.lock().clear();

    RevokedCertificates(h.core.clone()).run(10).await.unwrap();

    {
        let requests = h.authority.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].status, OcspStatus::Revoked);
        assert_eq!(requests[0].reason, 4);
    }
    assert_eq!(h.metrics.counter("ocsp.stored_revoked_responses"), 1);

    // Response now postdates the revocation.
    h.authority.requests.lock().clear();
    RevokedCertificates(h.core.clone()).run(10).await.unwrap();
    assert!(h.authority.requests.lock().is_empty());
}

#[tokio::test]
async fn missing_receipts_are_resubmitted() {
    let h = harness(ScriptedAuthority::default(), RecordingPublisher::default());
    issue(&h, "complete", ChronoDuration::hours(2));
    issue(&h, "partial", ChronoDuration::hours(1));
    issue(&h, "ancient", ChronoDuration::days(30));
    h.store.add_receipts("complete", 2);
    h.store.add_receipts("partial", 1);

    MissingSctReceipts(h.core.clone()).run(10).await.unwrap();

    let submitted = h.publisher.submitted.lock();
    assert_eq!(*submitted, vec![b"partial".to_vec()]);
    assert_eq!(h.metrics.counter("ocsp.submitted_to_ct"), 1);
}

#[tokio::test]
async fn failed_submission_is_counted_and_tick_succeeds() {
    let h = harness(
        ScriptedAuthority::default(),
        RecordingPublisher { fail: true, ..Default::default() },
    );
    issue(&h, "a", ChronoDuration::hours(1));
    issue(&h, "b", ChronoDuration::hours(1));

    MissingSctReceipts(h.core.clone()).run(10).await.unwrap();
    assert_eq!(h.metrics.counter("ocsp.errors.submit_to_ct"), 2);
}
