use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::watch::NotificationRequest;

/// Whether this replica is currently the elected leader. Followers apply the
/// same log entries for replication but must not duplicate notification
/// traffic.
pub trait Leadership {
    fn leading(&self) -> bool;
}

/// Leadership stub for single-node setups and tests.
pub struct AlwaysLeader;

impl Leadership for AlwaysLeader {
    fn leading(&self) -> bool {
        true
    }
}

pub struct NeverLeader;

impl Leadership for NeverLeader {
    fn leading(&self) -> bool {
        false
    }
}

/// Async HTTP collaborator that delivers watch notifications. Dispatch is
/// fire-and-forget: the transport owns its own timeouts and logs its own
/// failures.
pub trait NotificationTransport {
    fn dispatch(&self, request: NotificationRequest);
}

impl<T: NotificationTransport> NotificationTransport for std::sync::Arc<T> {
    fn dispatch(&self, request: NotificationRequest) {
        (**self).dispatch(request)
    }
}

/// Discards every notification.
pub struct NullTransport;

impl NotificationTransport for NullTransport {
    fn dispatch(&self, _request: NotificationRequest) {}
}

/// Captures dispatched notifications for assertions.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<NotificationRequest>>,
}

impl RecordingTransport {
    pub fn take(&self) -> Vec<NotificationRequest> {
        std::mem::take(&mut *self.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<NotificationRequest>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NotificationTransport for RecordingTransport {
    fn dispatch(&self, request: NotificationRequest) {
        self.lock().push(request);
    }
}

/// Consensus-append path for synthetic transactions. The TTL sweeper hands
/// expiry deletes here instead of applying them locally, so expiry reaches
/// every replica through the same log as any other mutation.
pub trait ProposalSink {
    fn propose(&self, transactions: Value);
}

impl<P: ProposalSink> ProposalSink for std::sync::Arc<P> {
    fn propose(&self, transactions: Value) {
        (**self).propose(transactions)
    }
}

/// Collects proposed transactions for assertions.
#[derive(Default)]
pub struct MemoryProposals {
    proposed: Mutex<Vec<Value>>,
}

impl MemoryProposals {
    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.proposed.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl ProposalSink for MemoryProposals {
    fn propose(&self, transactions: Value) {
        self.proposed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(transactions);
    }
}

/// Wall-clock access. TTL instants are the only place real time enters the
/// store, and they never leak into serialized tree content.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic TTL tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        ManualClock { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
