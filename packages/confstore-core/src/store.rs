use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::node::Node;
use crate::ops::{ApplyOutcome, Mutation, Transaction, WriteMode};
use crate::path::Path;
use crate::precondition::{check, CheckMode, CheckResult};
use crate::traits::{Clock, Leadership, NotificationTransport};
use crate::ttl::TtlIndex;
use crate::watch::{fan_out, WatchIndex};

/// Outcome of a single transaction plus the failing clause paths when the
/// precondition did not hold (checked in `Full` mode for diagnostics).
#[derive(Clone, Debug)]
pub struct TransactionResult {
    pub outcome: ApplyOutcome,
    pub check: CheckResult,
}

/// Everything the store lock guards, as one unit: the tree, the TTL index,
/// and the watch index. There is no fine-grained locking; holding a
/// `&mut StoreInner` *is* the critical section, which is why the mutating
/// methods live here rather than on [`Store`].
pub struct StoreInner {
    root: Node,
    ttl: TtlIndex,
    watches: WatchIndex,
}

impl StoreInner {
    fn new() -> Self {
        StoreInner {
            root: Node::new(),
            ttl: TtlIndex::default(),
            watches: WatchIndex::default(),
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn ttl(&self) -> &TtlIndex {
        &self.ttl
    }

    pub fn watches(&self) -> &WatchIndex {
        &self.watches
    }

    pub fn check(&self, precondition: &Value, mode: CheckMode) -> CheckResult {
        check(&self.root, precondition, mode)
    }

    /// Apply an admitted transaction's mutation set. Keys go in sorted-path
    /// order (established at parse time); a failure in one key is logged and
    /// skipped without rolling back the keys already applied.
    pub fn apply(&mut self, tx: &Transaction, now: DateTime<Utc>) {
        for (path, mutation) in &tx.mutations {
            if mutation.skips_missing_target() {
                // Expiries under the target are consumed even when the tree
                // holds nothing there; a replayed synthetic delete must
                // always retire its index entry.
                self.ttl.remove_subtree(path);
                if !self.root.has(path) {
                    continue;
                }
            }
            match mutation {
                Mutation::Assign { value } | Mutation::Replace { value } => {
                    let node = self.root.navigate(path);
                    node.apply_value(value);
                    node.clear_expiry();
                    self.ttl.remove_subtree(path);
                }
                Mutation::Set { value, ttl } => {
                    let node = self.root.navigate(path);
                    node.apply_value(value);
                    match ttl {
                        Some(secs) => {
                            let when = now + Duration::seconds(*secs);
                            node.set_expiry(when);
                            self.ttl.remove_subtree(path);
                            self.ttl.insert(when, path.clone());
                        }
                        None => {
                            node.clear_expiry();
                            self.ttl.remove_subtree(path);
                        }
                    }
                }
                Mutation::Delete | Mutation::Erase => {
                    self.root.remove(path);
                }
                Mutation::Increment { step } => {
                    if let Err(err) = self.root.navigate(path).add(*step) {
                        tracing::warn!(path = %path, %err, "key skipped");
                    }
                }
                Mutation::Decrement { step } => {
                    // i64::MIN has no negation; saturate instead of wrapping.
                    if let Err(err) = self.root.navigate(path).add(step.saturating_neg()) {
                        tracing::warn!(path = %path, %err, "key skipped");
                    }
                }
                Mutation::Push { value } => self.root.navigate(path).push(value),
                Mutation::Prepend { value } => self.root.navigate(path).prepend(value),
                Mutation::Pop => self.root.navigate(path).pop(),
                Mutation::Shift => self.root.navigate(path).shift(),
                Mutation::Observe { url } => {
                    self.watches.observe(url, path);
                }
                Mutation::Unobserve { url } => {
                    self.watches.unobserve(url, path);
                }
                Mutation::Unknown { .. } => {}
            }
        }
    }

    /// Merged read over the requested paths. Sorting plus segment-aware
    /// prefix dedup keeps read amplification bounded when paths overlap;
    /// hidden entries appear only when a requested path names one.
    pub fn read<S: AsRef<str>>(&self, queries: &[S]) -> Value {
        let mut paths: Vec<Path> = queries.iter().map(|q| Path::parse(q.as_ref())).collect();
        let show_hidden = paths.iter().any(Path::has_hidden_segment);
        paths.sort();
        // Sorted order puts a subsuming path immediately before everything
        // it covers, so comparing against the last kept path suffices.
        let mut kept: Vec<Path> = Vec::new();
        for path in paths {
            if !kept.last().is_some_and(|prev| prev.subsumes(&path)) {
                kept.push(path);
            }
        }

        if kept.len() == 1 {
            // Fast path: wrap the target subtree in the minimal scaffold,
            // copying no sibling data.
            let path = &kept[0];
            let resolved = self.root.exists(path);
            let mut value = if resolved == path.depth() {
                self.root
                    .lookup(path)
                    .map(|node| node.to_value(show_hidden))
                    .unwrap_or_else(|| Value::Object(Map::new()))
            } else {
                Value::Object(Map::new())
            };
            for seg in path.segments()[..resolved].iter().rev() {
                let mut wrap = Map::new();
                wrap.insert(seg.clone(), value);
                value = Value::Object(wrap);
            }
            return value;
        }

        // Slow path: assemble one consistent merged view in a scratch tree.
        let mut scratch = Node::new();
        for path in &kept {
            let resolved = self.root.exists(path);
            if resolved == path.depth() {
                if let Some(node) = self.root.lookup(path) {
                    *scratch.navigate(path) = node.clone();
                }
            } else {
                // Empty-branch placeholder at the resolved depth; serializes
                // as {}.
                scratch.navigate(&path.truncated(resolved));
            }
        }
        scratch.to_value(show_hidden)
    }

    /// Full dump as the fixed 4-tuple snapshot format: tree, path->expiry
    /// seconds, observer pairs, observed pairs.
    pub fn dump(&self, include_hidden: bool) -> Value {
        let tree = self.root.to_value(include_hidden);
        let mut expiries = Map::new();
        for (path, secs) in self.ttl.dump_seconds() {
            expiries.insert(path, Value::from(secs));
        }
        let observers: Vec<Value> = self
            .watches
            .observer_entries()
            .into_iter()
            .map(|(url, path)| single_entry(url, path))
            .collect();
        let observed: Vec<Value> = self
            .watches
            .observed_entries()
            .into_iter()
            .map(|(path, url)| single_entry(path, url))
            .collect();
        Value::Array(vec![
            tree,
            Value::Object(expiries),
            Value::Array(observers),
            Value::Array(observed),
        ])
    }

    /// Restore from a snapshot produced by [`StoreInner::dump`]. The format
    /// is append-only compatible: the four positions are fixed and trailing
    /// additions are ignored. Nothing is applied until the whole snapshot
    /// parses.
    pub fn load(&mut self, snapshot: &Value) -> Result<()> {
        let items = snapshot
            .as_array()
            .filter(|items| items.len() >= 4)
            .ok_or_else(|| {
                Error::MalformedSnapshot("expected a four-element array".into())
            })?;

        let mut root = Node::new();
        root.apply_value(&items[0]);

        let mut ttl = TtlIndex::default();
        let expiries = items[1]
            .as_object()
            .ok_or_else(|| Error::MalformedSnapshot("expiry table must be an object".into()))?;
        for (raw, secs) in expiries {
            let Some(secs) = secs.as_i64() else { continue };
            let Some(when) = Utc.timestamp_opt(secs, 0).single() else {
                continue;
            };
            let path = Path::parse(raw);
            // Expiries for paths absent from the restored tree are dropped.
            if let Some(node) = root_navigate_existing(&mut root, &path) {
                node.set_expiry(when);
                ttl.insert(when, path);
            }
        }

        let mut watches = WatchIndex::default();
        for (url, path) in snapshot_pairs(&items[2], "observer table")? {
            watches.observe(&url, &Path::parse(&path));
        }
        for (path, url) in snapshot_pairs(&items[3], "observed table")? {
            watches.observe(&url, &Path::parse(&path));
        }

        self.root = root;
        self.ttl = ttl;
        self.watches = watches;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.root = Node::new();
        self.ttl.clear();
        self.watches.clear();
    }
}

fn root_navigate_existing<'a>(root: &'a mut Node, path: &Path) -> Option<&'a mut Node> {
    if root.has(path) {
        Some(root.navigate(path))
    } else {
        None
    }
}

fn single_entry(key: String, value: String) -> Value {
    let mut entry = Map::new();
    entry.insert(key, Value::from(value));
    Value::Object(entry)
}

fn snapshot_pairs(raw: &Value, what: &str) -> Result<Vec<(String, String)>> {
    let entries = raw
        .as_array()
        .ok_or_else(|| Error::MalformedSnapshot(format!("{what} must be an array")))?;
    let mut pairs = Vec::with_capacity(entries.len());
    for entry in entries {
        let fields = entry
            .as_object()
            .filter(|fields| fields.len() == 1)
            .ok_or_else(|| {
                Error::MalformedSnapshot(format!("{what} entries must be single-pair objects"))
            })?;
        for (key, value) in fields {
            let value = value.as_str().ok_or_else(|| {
                Error::MalformedSnapshot(format!("{what} entry values must be strings"))
            })?;
            pairs.push((key.clone(), value.to_owned()));
        }
    }
    Ok(pairs)
}

/// The store façade: one exclusive lock over [`StoreInner`], plus the three
/// collaborator seams: leadership (who notifies), notification transport
/// (how), and the clock (TTL instants).
pub struct Store<L, T, C> {
    inner: Mutex<StoreInner>,
    leadership: L,
    transport: T,
    clock: C,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl<L, T, C> Store<L, T, C>
where
    L: Leadership,
    T: NotificationTransport,
    C: Clock,
{
    pub fn new(leadership: L, transport: T, clock: C) -> Self {
        // Capacity 1: the sweeper only needs to learn that *something*
        // changed, not how many times.
        let (wake_tx, wake_rx) = bounded(1);
        Store {
            inner: Mutex::new(StoreInner::new()),
            leadership,
            transport,
            clock,
            wake_tx,
            wake_rx,
        }
    }

    /// Take the exclusive lock. Callers needing a multi-step critical
    /// section hold the guard across the whole sequence; everything carried
    /// past its release must be a copy.
    pub fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply one transaction, checking its precondition in `Full` mode so
    /// every failing clause path is reported.
    pub fn apply_transaction(
        &self,
        entry: &Value,
        mode: WriteMode,
    ) -> Result<TransactionResult> {
        let tx = Transaction::parse(entry)?;
        if tx.requires_privilege() && !mode.privileged() {
            return Ok(TransactionResult {
                outcome: ApplyOutcome::Forbidden,
                check: CheckResult::default(),
            });
        }

        let result = {
            let mut inner = self.lock();
            match &tx.precondition {
                Some(pre) => {
                    let check = inner.check(pre, CheckMode::Full);
                    if check.successful() {
                        inner.apply(&tx, self.clock.now());
                        TransactionResult {
                            outcome: ApplyOutcome::Applied,
                            check,
                        }
                    } else {
                        tracing::trace!("precondition failed");
                        TransactionResult {
                            outcome: ApplyOutcome::PreconditionFailed,
                            check,
                        }
                    }
                }
                None => {
                    inner.apply(&tx, self.clock.now());
                    TransactionResult {
                        outcome: ApplyOutcome::Applied,
                        check: CheckResult::default(),
                    }
                }
            }
        };
        self.signal_wake();
        Ok(result)
    }

    /// Bulk entry point used before proposing to the log: one outcome per
    /// entry, in submission order. Permission and shape failures are
    /// reported per entry without aborting the batch; the outer request must
    /// still be an array.
    pub fn apply_transactions(
        &self,
        queries: &Value,
        mode: WriteMode,
    ) -> Result<Vec<ApplyOutcome>> {
        let entries = queries.as_array().ok_or_else(|| {
            Error::MalformedTransaction("request syntax is [[<queries>]]".into())
        })?;

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let tx = match Transaction::parse(entry) {
                Ok(tx) => tx,
                Err(err) => {
                    tracing::error!(%err, "rejecting transaction entry");
                    outcomes.push(ApplyOutcome::Failed);
                    continue;
                }
            };
            if tx.requires_privilege() && !mode.privileged() {
                outcomes.push(ApplyOutcome::Forbidden);
                continue;
            }

            let mut inner = self.lock();
            let admitted = match &tx.precondition {
                Some(pre) => inner.check(pre, CheckMode::FirstFail).successful(),
                None => true,
            };
            if admitted {
                inner.apply(&tx, self.clock.now());
                outcomes.push(ApplyOutcome::Applied);
            } else {
                tracing::trace!("precondition failed");
                outcomes.push(ApplyOutcome::PreconditionFailed);
            }
        }

        self.signal_wake();
        Ok(outcomes)
    }

    /// Apply already-agreed-upon log entries, in log order, under a single
    /// lock acquisition. Afterwards, when `inform` is set and this replica
    /// is leading, resolve the watch fan-out for the whole batch and hand
    /// the notifications to the transport.
    pub fn apply_log_entries(
        &self,
        queries: &Value,
        index: u64,
        term: u64,
        inform: bool,
    ) -> Result<Vec<bool>> {
        let entries = queries.as_array().ok_or_else(|| {
            Error::MalformedTransaction("log entries must be an array".into())
        })?;

        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            match Transaction::parse(entry) {
                Ok(tx) => parsed.push(Some(tx)),
                Err(err) => {
                    tracing::error!(%err, "skipping malformed log entry");
                    parsed.push(None);
                }
            }
        }

        let applied = {
            let mut inner = self.lock();
            let now = self.clock.now();
            parsed
                .iter()
                .map(|tx| match tx {
                    Some(tx) => {
                        inner.apply(tx, now);
                        true
                    }
                    None => false,
                })
                .collect()
        };
        self.signal_wake();

        if inform && self.leadership.leading() {
            let changes: Vec<(Path, String)> = parsed
                .iter()
                .flatten()
                .flat_map(|tx| tx.mutations.iter())
                .filter(|(_, mutation)| mutation.is_content_change())
                .map(|(path, mutation)| (path.clone(), mutation.name().to_owned()))
                .collect();
            let requests = {
                let inner = self.lock();
                fan_out(&inner.watches, &changes, term, index)
            };
            for request in requests {
                self.transport.dispatch(request);
            }
        }

        Ok(applied)
    }

    pub fn read<S: AsRef<str>>(&self, queries: &[S]) -> Value {
        self.lock().read(queries)
    }

    /// Deep copy of the node at `path`, if present.
    pub fn get(&self, path: &str) -> Option<Node> {
        self.lock().root.lookup(&Path::parse(path)).cloned()
    }

    pub fn has(&self, path: &str) -> bool {
        self.lock().root.has(&Path::parse(path))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn dump(&self, include_hidden: bool) -> Value {
        self.lock().dump(include_hidden)
    }

    pub fn load(&self, snapshot: &Value) -> Result<()> {
        self.lock().load(snapshot)
    }

    /// Synthetic delete transactions for every key expired as of the store
    /// clock, one single-element transaction per key. The index entries stay
    /// put; they are consumed when the deletes come back through the log.
    pub fn collect_expired(&self) -> Value {
        let now = self.clock.now();
        let inner = self.lock();
        let transactions: Vec<Value> = inner
            .ttl
            .expired(now)
            .into_iter()
            .map(|path| {
                let mut op = Map::new();
                op.insert("op".into(), Value::from("delete"));
                let mut entry = Map::new();
                entry.insert(path.to_string(), Value::Object(op));
                Value::Array(vec![Value::Object(entry)])
            })
            .collect();
        Value::Array(transactions)
    }

    /// Earliest indexed expiry; the sweeper's next deadline.
    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.lock().ttl.earliest()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Channel the sweeper waits on; one pending token at most.
    pub fn wake_receiver(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }

    fn signal_wake(&self) {
        let _ = self.wake_tx.try_send(());
    }
}
