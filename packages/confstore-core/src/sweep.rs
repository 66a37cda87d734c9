use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::store::Store;
use crate::traits::{Clock, Leadership, NotificationTransport, ProposalSink};

/// Shutdown handle for a running [`TtlSweeper`]. Dropping the handle also
/// stops the sweeper, since the channel disconnects.
pub struct SweeperHandle {
    shutdown_tx: Sender<()>,
}

impl SweeperHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.try_send(());
    }
}

/// Background expiry loop. Never deletes anything itself: each pass asks the
/// store for the keys expired as of now and proposes the resulting delete
/// transactions to the consensus sink, so expiry replays identically on every
/// replica.
///
/// Between passes it sleeps until the earliest indexed expiry (capped by
/// `poll_interval`), waking early when the store signals that a transaction
/// was applied or when shutdown is requested.
pub struct TtlSweeper<L, T, C, P> {
    store: Arc<Store<L, T, C>>,
    sink: P,
    poll_interval: Duration,
    wake_rx: Receiver<()>,
    shutdown_rx: Receiver<()>,
}

impl<L, T, C, P> TtlSweeper<L, T, C, P>
where
    L: Leadership,
    T: NotificationTransport,
    C: Clock,
    P: ProposalSink,
{
    pub fn new(
        store: Arc<Store<L, T, C>>,
        sink: P,
        poll_interval: Duration,
    ) -> (Self, SweeperHandle) {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let wake_rx = store.wake_receiver();
        let sweeper = TtlSweeper {
            store,
            sink,
            poll_interval,
            wake_rx,
            shutdown_rx,
        };
        (sweeper, SweeperHandle { shutdown_tx })
    }

    /// Run until shutdown. Intended for a dedicated thread.
    pub fn run(self) {
        tracing::debug!("expiry sweeper started");
        loop {
            let timeout = self.next_deadline();
            select! {
                recv(self.shutdown_rx) -> _ => break,
                recv(self.wake_rx) -> msg => {
                    // Disconnection means the store side is gone.
                    if msg.is_err() {
                        break;
                    }
                }
                default(timeout) => {}
            }
            self.sweep_once();
        }
        tracing::debug!("expiry sweeper stopped");
    }

    /// One sweep pass; exposed for deterministic tests.
    pub fn sweep_once(&self) {
        let transactions = self.store.collect_expired();
        let count = transactions.as_array().map_or(0, Vec::len);
        if count > 0 {
            tracing::debug!(count, "proposing expiry deletes");
            self.sink.propose(transactions);
        }
    }

    /// Sleep no longer than the earliest indexed expiry, capped by the poll
    /// interval. A past-due entry lingers until its proposed delete replays
    /// through the log, so it gets a short backoff rather than a zero wait.
    fn next_deadline(&self) -> Duration {
        const PAST_DUE_BACKOFF: Duration = Duration::from_millis(100);
        let Some(earliest) = self.store.next_expiry() else {
            return self.poll_interval;
        };
        let until = earliest - self.store.clock().now();
        match until.to_std() {
            Ok(until) => until.min(self.poll_interval),
            Err(_) => PAST_DUE_BACKOFF.min(self.poll_interval),
        }
    }
}
