use serde_json::Value;

use crate::error::{Error, Result};
use crate::path::Path;

/// Keys carrying this marker at the very front of the path are reserved for
/// cluster reconfiguration and require a privileged write mode.
pub const PRIVILEGED_MARKER: &str = "reconfigure";

/// One decoded per-key mutation. The wire form is either a plain value (an
/// assignment) or an object with an `"op"` discriminator; decoding happens
/// exactly once, at transaction-parse time. Unrecognized ops land in
/// `Unknown` and are ignored when applied, so newer peers can ship ops older
/// ones skip.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Plain value without an `"op"` field: wholesale assignment.
    Assign { value: Value },
    /// Assignment with an optional relative TTL in seconds.
    Set { value: Value, ttl: Option<i64> },
    Delete,
    /// Wholesale replacement; skipped when the target does not exist.
    Replace { value: Value },
    /// Alias of `Delete` kept for wire compatibility.
    Erase,
    Increment { step: i64 },
    Decrement { step: i64 },
    Push { value: Value },
    Prepend { value: Value },
    Pop,
    Shift,
    /// Register `(url, path)` in the watch index instead of touching the tree.
    Observe { url: String },
    Unobserve { url: String },
    Unknown { name: String },
}

impl Mutation {
    pub fn decode(raw: &Value) -> Mutation {
        let Some(entries) = raw.as_object() else {
            return Mutation::Assign { value: raw.clone() };
        };
        let Some(op) = entries.get("op") else {
            return Mutation::Assign { value: raw.clone() };
        };
        let Some(name) = op.as_str() else {
            tracing::warn!(op = %op, "non-string op discriminator ignored");
            return Mutation::Unknown {
                name: op.to_string(),
            };
        };

        // "new" is the canonical payload key; "value" is accepted as an alias.
        let payload = entries.get("new").or_else(|| entries.get("value"));
        let step = entries.get("step").and_then(Value::as_i64).unwrap_or(1);

        match name {
            "set" => match payload {
                Some(value) => Mutation::Set {
                    value: value.clone(),
                    ttl: entries.get("ttl").and_then(Value::as_i64),
                },
                None => Self::missing_payload(name),
            },
            "delete" => Mutation::Delete,
            "replace" => match payload {
                Some(value) => Mutation::Replace {
                    value: value.clone(),
                },
                None => Self::missing_payload(name),
            },
            "erase" => Mutation::Erase,
            "increment" => Mutation::Increment { step },
            "decrement" => Mutation::Decrement { step },
            "push" => match payload {
                Some(value) => Mutation::Push {
                    value: value.clone(),
                },
                None => Self::missing_payload(name),
            },
            "prepend" => match payload {
                Some(value) => Mutation::Prepend {
                    value: value.clone(),
                },
                None => Self::missing_payload(name),
            },
            "pop" => Mutation::Pop,
            "shift" => Mutation::Shift,
            "observe" | "unobserve" => match entries.get("url").and_then(Value::as_str) {
                Some(url) if name == "observe" => Mutation::Observe {
                    url: url.to_owned(),
                },
                Some(url) => Mutation::Unobserve {
                    url: url.to_owned(),
                },
                None => {
                    tracing::warn!(op = name, "observe mutation without a url ignored");
                    Mutation::Unknown {
                        name: name.to_owned(),
                    }
                }
            },
            other => {
                tracing::warn!(op = other, "unknown op ignored");
                Mutation::Unknown {
                    name: other.to_owned(),
                }
            }
        }
    }

    fn missing_payload(name: &str) -> Mutation {
        tracing::warn!(op = name, "op without a payload ignored");
        Mutation::Unknown {
            name: name.to_owned(),
        }
    }

    /// Wire name, as reported to watchers.
    pub fn name(&self) -> &str {
        match self {
            Mutation::Assign { .. } | Mutation::Set { .. } => "set",
            Mutation::Delete => "delete",
            Mutation::Replace { .. } => "replace",
            Mutation::Erase => "erase",
            Mutation::Increment { .. } => "increment",
            Mutation::Decrement { .. } => "decrement",
            Mutation::Push { .. } => "push",
            Mutation::Prepend { .. } => "prepend",
            Mutation::Pop => "pop",
            Mutation::Shift => "shift",
            Mutation::Observe { .. } => "observe",
            Mutation::Unobserve { .. } => "unobserve",
            Mutation::Unknown { name } => name,
        }
    }

    /// Whether this mutation changes tree content. Watch-index maintenance
    /// and ignored ops do not fan out to subscribers.
    pub fn is_content_change(&self) -> bool {
        !matches!(
            self,
            Mutation::Observe { .. } | Mutation::Unobserve { .. } | Mutation::Unknown { .. }
        )
    }

    /// Deleting variants are silent no-ops on absent targets; nothing may
    /// auto-vivify on their behalf.
    pub fn skips_missing_target(&self) -> bool {
        matches!(
            self,
            Mutation::Delete | Mutation::Replace { .. } | Mutation::Erase
        )
    }
}

/// One log-entry-sized unit of work: an ordered mutation set, an optional
/// precondition object, and an optional client id. The wire form is a one-
/// to three-element array `[mutations, precondition?, clientId?]`; a bare
/// mutation object (the form that survives consensus once preconditions
/// have been checked at proposal time) is accepted too.
#[derive(Clone, Debug)]
pub struct Transaction {
    /// Mutations keyed by normalized absolute path, ascending. The sort is
    /// load-bearing: a parent path applies before any of its descendants,
    /// identically on every replica.
    pub mutations: Vec<(Path, Mutation)>,
    pub precondition: Option<Value>,
    pub client_id: Option<String>,
}

impl Transaction {
    pub fn parse(entry: &Value) -> Result<Transaction> {
        match entry {
            Value::Object(_) => Ok(Transaction {
                mutations: Self::parse_mutations(entry)?,
                precondition: None,
                client_id: None,
            }),
            Value::Array(items) => {
                if items.is_empty() || items.len() > 3 {
                    return Err(Error::MalformedTransaction(format!(
                        "expected one to three elements, got {}",
                        items.len()
                    )));
                }
                let precondition = match items.get(1) {
                    None => None,
                    Some(p) if p.is_object() => Some(p.clone()),
                    Some(p) => {
                        return Err(Error::MalformedTransaction(format!(
                            "precondition must be an object, got {}",
                            p
                        )))
                    }
                };
                Ok(Transaction {
                    mutations: Self::parse_mutations(&items[0])?,
                    precondition,
                    client_id: items.get(2).and_then(Value::as_str).map(str::to_owned),
                })
            }
            other => Err(Error::MalformedTransaction(format!(
                "expected an array or object, got {}",
                other
            ))),
        }
    }

    fn parse_mutations(raw: &Value) -> Result<Vec<(Path, Mutation)>> {
        let Some(entries) = raw.as_object() else {
            return Err(Error::MalformedTransaction(format!(
                "mutation set must be an object, got {}",
                raw
            )));
        };
        let mut mutations: Vec<(Path, Mutation)> = entries
            .iter()
            .map(|(key, value)| (Path::parse(key), Mutation::decode(value)))
            .collect();
        mutations.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(mutations)
    }

    /// Whether any mutation key carries the reserved reconfiguration marker
    /// at the front of the path.
    pub fn requires_privilege(&self) -> bool {
        self.mutations.iter().any(|(path, _)| {
            path.to_string()
                .find(PRIVILEGED_MARKER)
                .is_some_and(|pos| pos <= 1)
        })
    }
}

/// Per-entry result of transaction application, in submission order.
/// `PreconditionFailed` is kept distinct so clients can retry optimistic
/// compare-and-swap patterns safely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    PreconditionFailed,
    Forbidden,
    Failed,
}

impl ApplyOutcome {
    pub fn applied(self) -> bool {
        self == ApplyOutcome::Applied
    }
}

/// Privilege level of the submitting caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Normal,
    Privileged,
}

impl WriteMode {
    pub fn privileged(self) -> bool {
        self == WriteMode::Privileged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_values_decode_as_assign() {
        assert_eq!(
            Mutation::decode(&json!(42)),
            Mutation::Assign { value: json!(42) }
        );
        // An object without "op" is data, not an op.
        assert_eq!(
            Mutation::decode(&json!({"nested": true})),
            Mutation::Assign {
                value: json!({"nested": true})
            }
        );
    }

    #[test]
    fn op_objects_decode_to_closed_variants() {
        assert_eq!(
            Mutation::decode(&json!({"op": "set", "new": 1, "ttl": 30})),
            Mutation::Set {
                value: json!(1),
                ttl: Some(30)
            }
        );
        assert_eq!(
            Mutation::decode(&json!({"op": "increment", "step": 5})),
            Mutation::Increment { step: 5 }
        );
        assert_eq!(
            Mutation::decode(&json!({"op": "increment"})),
            Mutation::Increment { step: 1 }
        );
        // "value" is accepted as payload alias.
        assert_eq!(
            Mutation::decode(&json!({"op": "replace", "value": {}})),
            Mutation::Replace { value: json!({}) }
        );
        assert_eq!(
            Mutation::decode(&json!({"op": "frobnicate"})),
            Mutation::Unknown {
                name: "frobnicate".into()
            }
        );
    }

    #[test]
    fn transaction_arity_is_enforced() {
        assert!(Transaction::parse(&json!([])).is_err());
        assert!(Transaction::parse(&json!([{}, {}, "id", "extra"])).is_err());
        assert!(Transaction::parse(&json!("nope")).is_err());
        assert!(Transaction::parse(&json!([{"/a": 1}, "not-an-object"])).is_err());

        let tx = Transaction::parse(&json!([{"/a": 1}, {"/a": {"oldEmpty": true}}, "c1"])).unwrap();
        assert_eq!(tx.client_id.as_deref(), Some("c1"));
        assert!(tx.precondition.is_some());
    }

    #[test]
    fn mutation_keys_sort_parent_first() {
        let tx = Transaction::parse(&json!([{
            "/a/b": 5,
            "/a": {"op": "replace", "new": {}},
            "/b": 1
        }]))
        .unwrap();
        let order: Vec<String> = tx.mutations.iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(order, vec!["/a", "/a/b", "/b"]);
    }

    #[test]
    fn reserved_marker_requires_privilege() {
        let tx = Transaction::parse(&json!([{"/reconfigure/members": 1}])).unwrap();
        assert!(tx.requires_privilege());
        let tx = Transaction::parse(&json!([{"reconfigure": 1}])).unwrap();
        assert!(tx.requires_privilege());
        let tx = Transaction::parse(&json!([{"/cluster/reconfigure": 1}])).unwrap();
        assert!(!tx.requires_privilege());
    }
}
