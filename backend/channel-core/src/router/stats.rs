use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of what the router has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterStats {
    pub dispatched: u64,
    pub unknown: u64,
    pub anomalies: u64,
    pub notices: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RouterCounters {
    dispatched: AtomicU64,
    unknown: AtomicU64,
    anomalies: AtomicU64,
    notices: AtomicU64,
}

impl RouterCounters {
    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown(&self) {
        self.unknown.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notice(&self) {
        self.notices.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RouterStats {
        RouterStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            notices: self.notices.load(Ordering::Relaxed),
        }
    }
}
