use confstore_core::{AlwaysLeader, NullTransport, Store, SystemClock, WriteMode};
use serde_json::json;

fn populated() -> Store<AlwaysLeader, NullTransport, SystemClock> {
    let store = Store::new(AlwaysLeader, NullTransport, SystemClock);
    store
        .apply_transactions(
            &json!([[{
                "/cluster/nodes/n1": {"status": "up"},
                "/cluster/nodes/n2": {"status": "down"},
                "/cluster/leader": "n1",
                "/jobs/pending": [1, 2],
                "/.system/token": "secret"
            }]]),
            WriteMode::Normal,
        )
        .unwrap();
    store
}

#[test]
fn single_path_reads_return_wrapped_subtrees() {
    let store = populated();
    assert_eq!(
        store.read(&["/cluster/leader"]),
        json!({"cluster": {"leader": "n1"}})
    );
    assert_eq!(
        store.read(&["/cluster/nodes"]),
        json!({"cluster": {"nodes": {"n1": {"status": "up"}, "n2": {"status": "down"}}}})
    );
}

#[test]
fn merged_reads_combine_disjoint_subtrees() {
    let store = populated();
    assert_eq!(
        store.read(&["/cluster/leader", "/jobs"]),
        json!({"cluster": {"leader": "n1"}, "jobs": {"pending": [1, 2]}})
    );
}

#[test]
fn covered_paths_add_nothing() {
    let store = populated();
    let broad = store.read(&["/cluster"]);
    assert_eq!(store.read(&["/cluster", "/cluster/nodes/n1"]), broad);
    assert_eq!(store.read(&["/cluster/nodes/n1", "/cluster"]), broad);
    // Sibling names sharing a prefix string are not covered.
    assert_ne!(
        store.read(&["/cluster"]),
        store.read(&["/cluster", "/jobs"])
    );
}

#[test]
fn query_order_is_irrelevant() {
    let store = populated();
    assert_eq!(
        store.read(&["/jobs", "/cluster/leader"]),
        store.read(&["/cluster/leader", "/jobs"])
    );
}

#[test]
fn partially_resolving_paths_leave_an_empty_object() {
    let store = populated();
    assert_eq!(
        store.read(&["/cluster/nodes/n3/status"]),
        json!({"cluster": {"nodes": {}}})
    );
    assert_eq!(store.read(&["/nowhere/at/all"]), json!({}));
    // Descending through a leaf resolves only up to the leaf's parent.
    assert_eq!(
        store.read(&["/cluster/leader/deeper"]),
        json!({"cluster": {"leader": {}}})
    );
}

#[test]
fn mixed_resolution_in_one_merged_read() {
    let store = populated();
    assert_eq!(
        store.read(&["/jobs", "/cluster/nodes/n3/status"]),
        json!({"cluster": {"nodes": {}}, "jobs": {"pending": [1, 2]}})
    );
}

#[test]
fn hidden_subtrees_are_filtered_unless_named() {
    let store = populated();
    let top = store.read(&["/"]);
    assert!(top.get(".system").is_none());

    // Naming a hidden path opts the whole read into hidden entries.
    assert_eq!(
        store.read(&["/.system/token"]),
        json!({".system": {"token": "secret"}})
    );
    let merged = store.read(&["/.system", "/cluster/leader"]);
    assert_eq!(
        merged,
        json!({".system": {"token": "secret"}, "cluster": {"leader": "n1"}})
    );
}

#[test]
fn reads_never_mutate() {
    let store = populated();
    let before = store.dump(true);
    store.read(&["/cluster", "/nowhere/deep", "/.system"]);
    assert_eq!(store.dump(true), before);
}

#[test]
fn duplicate_slashes_normalize_in_queries() {
    let store = populated();
    assert_eq!(
        store.read(&["//cluster///leader/"]),
        store.read(&["/cluster/leader"])
    );
}
