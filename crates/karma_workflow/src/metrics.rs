//! Workflow metrics
//!
//! Lock-free counters, one set per workflow instance. Read them through
//! [`WorkflowMetrics::snapshot`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    // Session lifecycle
    pub sessions_created: AtomicU64,
    pub sessions_expired: AtomicU64,

    // Terminal outcomes
    pub transfers_committed: AtomicU64,
    pub transfers_declined: AtomicU64,

    // Rejected input
    pub policy_rejections: AtomicU64,
    pub stale_inputs: AtomicU64,

    // Adapter failures
    pub ledger_failures: AtomicU64,
    pub transport_failures: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_created: u64,
    pub sessions_expired: u64,
    pub transfers_committed: u64,
    pub transfers_declined: u64,
    pub policy_rejections: u64,
    pub stale_inputs: u64,
    pub ledger_failures: u64,
    pub transport_failures: u64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_sessions_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_sessions_expired(&self) {
        self.sessions_expired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_transfers_committed(&self) {
        self.transfers_committed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_transfers_declined(&self) {
        self.transfers_declined.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_policy_rejections(&self) {
        self.policy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_stale_inputs(&self) {
        self.stale_inputs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_ledger_failures(&self) {
        self.ledger_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_transport_failures(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_expired: self.sessions_expired.load(Ordering::Relaxed),
            transfers_committed: self.transfers_committed.load(Ordering::Relaxed),
            transfers_declined: self.transfers_declined.load(Ordering::Relaxed),
            policy_rejections: self.policy_rejections.load(Ordering::Relaxed),
            stale_inputs: self.stale_inputs.load(Ordering::Relaxed),
            ledger_failures: self.ledger_failures.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }
}
