use serde_json::Value;

use crate::node::Node;
use crate::path::Path;

/// `FirstFail` stops at the first failing clause; `Full` keeps going and
/// collects every failing clause path for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckMode {
    FirstFail,
    Full,
}

/// Outcome of a precondition check: the paths of failing clauses, each
/// recorded at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckResult {
    failed: Vec<String>,
}

impl CheckResult {
    pub fn successful(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_paths(&self) -> &[String] {
        &self.failed
    }
}

/// Evaluate a precondition object against the current tree. Caller holds
/// the store lock; the tree must not move under the check.
///
/// Clause keys combine conjunctively. A clause that is not an object is
/// shorthand for `{"old": clause}`. Absent paths are compared as an empty
/// branch. Object clauses containing none of the recognized keys are warned
/// about and pass, so precondition vocabulary can grow without breaking old
/// peers.
pub fn check(root: &Node, precondition: &Value, mode: CheckMode) -> CheckResult {
    let mut result = CheckResult::default();
    let Some(clauses) = precondition.as_object() else {
        tracing::warn!(value = %precondition, "non-object precondition ignored");
        return result;
    };

    let absent = Node::new();
    for (key, clause) in clauses {
        let path = Path::parse(key);
        let node = root.lookup(&path);
        let found = node.is_some();
        let node = node.unwrap_or(&absent);

        let failed = match clause.as_object() {
            Some(tests) => tests.iter().any(|(oper, expected)| {
                clause_fails(oper, expected, node, found, key)
            }),
            // Shorthand for {"old": clause}.
            None => !node.matches_value(clause),
        };

        if failed {
            result.failed.push(key.clone());
            if mode == CheckMode::FirstFail {
                break;
            }
        }
    }
    result
}

fn clause_fails(oper: &str, expected: &Value, node: &Node, found: bool, key: &str) -> bool {
    match oper {
        "old" => !node.matches_value(expected),
        "oldNot" => node.matches_value(expected),
        "oldEmpty" => match expected.as_bool() {
            // true: path must be absent; false: path must exist.
            Some(want_absent) => want_absent == found,
            None => {
                tracing::error!(key, "non-boolean expression for 'oldEmpty' precondition");
                true
            }
        },
        "isArray" => match expected.as_bool() {
            Some(want_array) => {
                let is_array = node.leaf_array().is_some();
                want_array != is_array
            }
            None => {
                tracing::error!(key, "non-boolean expression for 'isArray' precondition");
                true
            }
        },
        // Fails iff the described containment does not hold.
        "in" => !(found
            && node
                .leaf_array()
                .is_some_and(|items| items.contains(expected))),
        "notin" => {
            found
                && node
                    .leaf_array()
                    .is_some_and(|items| items.contains(expected))
        }
        other => {
            tracing::warn!(
                key,
                oper = other,
                "malformed object-type precondition was ignored"
            );
            false
        }
    }
}
