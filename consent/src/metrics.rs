//! Flow counters.
//!
//! Counters are plain atomics injected into the environment; exporting them is
//! left to the embedding service.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counted flow events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowMetric {
    /// User agent sent to the login UI.
    LoginForwarded,
    /// Login UI told to skip the prompt.
    LoginSkipped,
    /// Login verifier redeemed successfully.
    LoginVerified,
    /// Login verification failed.
    LoginRejected,
    /// User agent sent to the consent UI.
    ConsentForwarded,
    /// Consent UI told to skip the prompt.
    ConsentSkipped,
    /// Consent verifier redeemed successfully.
    ConsentVerified,
    /// Consent verification failed.
    ConsentRejected,
    /// CSRF validation failed.
    CsrfRejected,
    /// Logout request created.
    LogoutInitiated,
    /// Logout completed.
    LogoutCompleted,
    /// Back-channel logout delivered.
    BackChannelDelivered,
    /// Back-channel logout failed.
    BackChannelFailed,
}

impl FlowMetric {
    const COUNT: usize = 13;

    const fn index(self) -> usize {
        self as usize
    }
}

/// Atomic flow counters.
#[derive(Debug, Default)]
pub struct FlowMetrics {
    counters: [AtomicU64; FlowMetric::COUNT],
}

impl FlowMetrics {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter.
    pub fn increment(&self, metric: FlowMetric) {
        self.counters[metric.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of a counter.
    #[must_use]
    pub fn get(&self, metric: FlowMetric) -> u64 {
        self.counters[metric.index()].load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            login_forwarded: self.get(FlowMetric::LoginForwarded),
            login_skipped: self.get(FlowMetric::LoginSkipped),
            login_verified: self.get(FlowMetric::LoginVerified),
            login_rejected: self.get(FlowMetric::LoginRejected),
            consent_forwarded: self.get(FlowMetric::ConsentForwarded),
            consent_skipped: self.get(FlowMetric::ConsentSkipped),
            consent_verified: self.get(FlowMetric::ConsentVerified),
            consent_rejected: self.get(FlowMetric::ConsentRejected),
            csrf_rejected: self.get(FlowMetric::CsrfRejected),
            logout_initiated: self.get(FlowMetric::LogoutInitiated),
            logout_completed: self.get(FlowMetric::LogoutCompleted),
            backchannel_delivered: self.get(FlowMetric::BackChannelDelivered),
            backchannel_failed: self.get(FlowMetric::BackChannelFailed),
        }
    }
}

/// Copy of the counters.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub login_forwarded: u64,
    pub login_skipped: u64,
    pub login_verified: u64,
    pub login_rejected: u64,
    pub consent_forwarded: u64,
    pub consent_skipped: u64,
    pub consent_verified: u64,
    pub consent_rejected: u64,
    pub csrf_rejected: u64,
    pub logout_initiated: u64,
    pub logout_completed: u64,
    pub backchannel_delivered: u64,
    pub backchannel_failed: u64,
}
