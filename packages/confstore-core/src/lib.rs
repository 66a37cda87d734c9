#![forbid(unsafe_code)]
//! Replicated configuration store: the in-memory state machine a cluster
//! coordination service applies agreed-upon log entries to. Combines a
//! path-addressed value tree, precondition-gated multi-key transactions,
//! log-replicated per-key expiry, and path-prefix watch notifications.
//! Consensus, transport, and time are pluggable through the traits defined
//! here so the store can be embedded in an agent, a simulator, or a test.

pub mod error;
pub mod node;
pub mod ops;
pub mod path;
pub mod precondition;
pub mod store;
pub mod sweep;
pub mod traits;
pub mod ttl;
pub mod watch;

pub use error::{Error, Result};
pub use node::Node;
pub use ops::{ApplyOutcome, Mutation, Transaction, WriteMode, PRIVILEGED_MARKER};
pub use path::Path;
pub use precondition::{check, CheckMode, CheckResult};
pub use store::{Store, StoreInner, TransactionResult};
pub use sweep::{SweeperHandle, TtlSweeper};
pub use traits::{
    AlwaysLeader, Clock, Leadership, ManualClock, MemoryProposals, NeverLeader,
    NotificationTransport, NullTransport, ProposalSink, RecordingTransport, SystemClock,
};
pub use ttl::TtlIndex;
pub use watch::{Destination, NotificationRequest, WatchIndex};
