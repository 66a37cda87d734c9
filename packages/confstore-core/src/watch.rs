use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::path::Path;

const DEFAULT_PORT: &str = "8529";

/// Mirrored multimaps between subscriber URLs and watched paths. Both
/// directions are kept in exact lockstep; a `(url, path)` pair is unique and
/// re-registering it is a no-op.
#[derive(Clone, Debug, Default)]
pub struct WatchIndex {
    /// url -> watched paths (canonical form)
    observers: BTreeMap<String, BTreeSet<String>>,
    /// watched path -> urls
    observed: BTreeMap<String, BTreeSet<String>>,
}

impl WatchIndex {
    /// Register `(url, path)`. Returns whether the pair was new.
    pub fn observe(&mut self, url: &str, path: &Path) -> bool {
        let key = path.to_string();
        let added = self
            .observers
            .entry(url.to_owned())
            .or_default()
            .insert(key.clone());
        if added {
            self.observed.entry(key).or_default().insert(url.to_owned());
        }
        added
    }

    /// Deregister `(url, path)`. Returns whether the pair existed.
    pub fn unobserve(&mut self, url: &str, path: &Path) -> bool {
        let key = path.to_string();
        let removed = match self.observers.get_mut(url) {
            Some(paths) => paths.remove(&key),
            None => false,
        };
        if removed {
            if self.observers.get(url).is_some_and(BTreeSet::is_empty) {
                self.observers.remove(url);
            }
            if let Some(urls) = self.observed.get_mut(&key) {
                urls.remove(url);
                if urls.is_empty() {
                    self.observed.remove(&key);
                }
            }
        }
        removed
    }

    pub fn urls_watching(&self, path: &str) -> impl Iterator<Item = &str> {
        self.observed
            .get(path)
            .into_iter()
            .flat_map(|urls| urls.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn clear(&mut self) {
        self.observers.clear();
        self.observed.clear();
    }

    /// `(url, path)` pairs in table order, for snapshot dumps.
    pub fn observer_entries(&self) -> Vec<(String, String)> {
        self.observers
            .iter()
            .flat_map(|(url, paths)| paths.iter().map(move |p| (url.clone(), p.clone())))
            .collect()
    }

    /// `(path, url)` pairs in table order, for snapshot dumps.
    pub fn observed_entries(&self) -> Vec<(String, String)> {
        self.observed
            .iter()
            .flat_map(|(path, urls)| urls.iter().map(move |u| (path.clone(), u.clone())))
            .collect()
    }
}

/// Transport address for one notification, derived from the subscriber URL:
/// `http://` becomes `tcp://`, `https://` becomes `ssl://`, the port
/// defaults to 8529, and the URL's path component is split off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub endpoint: String,
    pub path: String,
}

impl Destination {
    pub fn from_url(url: &str) -> Option<Destination> {
        let (scheme, rest) = if let Some(rest) = url.strip_prefix("http://") {
            ("tcp://", rest)
        } else if let Some(rest) = url.strip_prefix("https://") {
            ("ssl://", rest)
        } else {
            return None;
        };

        let (authority, path) = match rest.find('/') {
            Some(pos) => (&rest[..pos], rest[pos..].to_owned()),
            None => (rest, "/".to_owned()),
        };

        let endpoint = if authority.contains(':') {
            format!("{scheme}{authority}")
        } else {
            format!("{scheme}{authority}:{DEFAULT_PORT}")
        };
        Some(Destination { endpoint, path })
    }
}

/// One outbound POST, fire-and-forget. Delivery failures are the transport's
/// problem and never reach back into transaction outcomes.
#[derive(Clone, Debug)]
pub struct NotificationRequest {
    pub url: String,
    pub destination: Destination,
    /// `{"term": t, "index": i, <watched>: {<changed>: {"op": name}}, ...}`
    pub body: Value,
}

/// Resolve the notifications owed for one applied batch. Every changed path
/// is walked up its ancestor chain (itself included, the root excluded);
/// subscribers found along the way get one request each, with duplicate
/// changed-path entries collapsed last-write-wins.
pub fn fan_out(
    index: &WatchIndex,
    changes: &[(Path, String)],
    term: u64,
    log_index: u64,
) -> Vec<NotificationRequest> {
    // url -> watched path -> changed path -> op
    let mut grouped: BTreeMap<&str, BTreeMap<String, BTreeMap<String, String>>> = BTreeMap::new();
    for (path, oper) in changes {
        for ancestor in path.self_and_ancestors() {
            let watched = ancestor.to_string();
            for url in index.urls_watching(&watched) {
                grouped
                    .entry(url)
                    .or_default()
                    .entry(watched.clone())
                    .or_default()
                    .insert(path.to_string(), oper.clone());
            }
        }
    }

    let mut requests = Vec::new();
    for (url, watched_map) in grouped {
        let Some(destination) = Destination::from_url(url) else {
            tracing::warn!(url, "malformed URL");
            continue;
        };
        let mut body = Map::new();
        body.insert("term".into(), Value::from(term));
        body.insert("index".into(), Value::from(log_index));
        for (watched, changed_map) in watched_map {
            let mut per_watched = Map::new();
            for (changed, oper) in changed_map {
                let mut op = Map::new();
                op.insert("op".into(), Value::from(oper));
                per_watched.insert(changed, Value::Object(op));
            }
            body.insert(watched, Value::Object(per_watched));
        }
        requests.push(NotificationRequest {
            url: url.to_owned(),
            destination,
            body: Value::Object(body),
        });
    }
    requests
}
