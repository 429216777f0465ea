//! Metrics sink used by the scheduler, the RPC client and the work units.
//!
//! Names are hierarchical and dot separated (`ocsp.new_certificates.ticks`).

use std::sync::Arc;
use std::time::Duration;

/// Counter and timer sink.
pub trait Stats: Send + Sync {
    fn inc(&self, name: &str, value: u64);
    fn timing(&self, name: &str, elapsed: Duration);
}

/// Forwards to whatever recorder is installed in the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeStats;

impl Stats for FacadeStats {
    fn inc(&self, name: &str, value: u64) {
        metrics::counter!(name.to_owned()).increment(value);
    }

    fn timing(&self, name: &str, elapsed: Duration) {
        metrics::histogram!(name.to_owned()).record(elapsed.as_secs_f64());
    }
}

/// Prefixes every name with a fixed scope before handing it on.
#[derive(Clone)]
pub struct ScopedStats {
    prefix: String,
    inner: Arc<dyn Stats>,
}

impl ScopedStats {
    pub fn new(inner: Arc<dyn Stats>, scopes: &[&str]) -> Self {
        Self { prefix: scopes.join("."), inner }
    }

    /// Nest further scopes under this one.
    pub fn scope(&self, scopes: &[&str]) -> Self {
        let mut prefix = self.prefix.clone();
        for s in scopes {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(s);
        }
        Self { prefix, inner: Arc::clone(&self.inner) }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn qualify(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }
}

impl Stats for ScopedStats {
    fn inc(&self, name: &str, value: u64) {
        self.inner.inc(&self.qualify(name), value);
    }

    fn timing(&self, name: &str, elapsed: Duration) {
        self.inner.timing(&self.qualify(name), elapsed);
    }
}
