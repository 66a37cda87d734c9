use confstore_core::{AlwaysLeader, ApplyOutcome, NullTransport, Store, SystemClock, WriteMode};
use serde_json::{json, Value};

fn store() -> Store<AlwaysLeader, NullTransport, SystemClock> {
    Store::new(AlwaysLeader, NullTransport, SystemClock)
}

#[test]
fn replay_is_deterministic() {
    let entries = json!([
        [{"/cluster/nodes/n1": {"status": "up", "weight": 3}}],
        [{"/cluster/nodes/n2": {"status": "down"}}],
        [{"/cluster/nodes/n1/weight": {"op": "increment", "step": 2}}],
        [{"/cluster/nodes/n2": {"op": "delete"}}],
        [{"/queue": {"op": "push", "new": "job-1"}}],
        [{"/queue": {"op": "push", "new": "job-2"}}],
        [{"/queue": {"op": "shift"}}]
    ]);

    let a = store();
    let b = store();
    a.apply_log_entries(&entries, 7, 1, false).unwrap();
    b.apply_log_entries(&entries, 7, 1, false).unwrap();

    assert_eq!(a.dump(true), b.dump(true));
    assert_eq!(
        a.read(&["/"]),
        json!({
            "cluster": {"nodes": {"n1": {"status": "up", "weight": 5}}},
            "queue": ["job-2"]
        })
    );
}

#[test]
fn disjoint_transactions_commute() {
    let entries = vec![
        json!([{"/a/x": 1}]),
        json!([{"/b/y": {"op": "push", "new": 2}}]),
        json!([{"/c": {"op": "increment"}}]),
        json!([{"/d": "value"}]),
    ];

    fn heap_permute(k: usize, items: &mut [Value], res: &mut Vec<Vec<Value>>) {
        if k == 1 {
            res.push(items.to_vec());
            return;
        }
        heap_permute(k - 1, items, res);
        for i in 0..(k - 1) {
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
            heap_permute(k - 1, items, res);
        }
    }
    let mut permutations = Vec::new();
    heap_permute(entries.len(), &mut entries.clone(), &mut permutations);

    let mut baseline: Option<Value> = None;
    for perm in permutations {
        let store = store();
        let applied = store
            .apply_log_entries(&Value::Array(perm), 1, 1, false)
            .unwrap();
        assert!(applied.iter().all(|a| *a));
        let dump = store.dump(true);
        if let Some(base) = &baseline {
            assert_eq!(&dump, base);
        } else {
            baseline = Some(dump);
        }
    }
}

#[test]
fn multi_key_transaction_is_atomic_under_precondition() {
    let store = store();
    store
        .apply_transactions(&json!([[{"/balance/a": 10, "/balance/b": 0}]]), WriteMode::Normal)
        .unwrap();

    // Guarded transfer succeeds once.
    let transfer = json!([[
        {
            "/balance/a": {"op": "decrement", "step": 10},
            "/balance/b": {"op": "increment", "step": 10}
        },
        {"/balance/a": {"old": 10}}
    ]]);
    let outcomes = store.apply_transactions(&transfer, WriteMode::Normal).unwrap();
    assert_eq!(outcomes, vec![ApplyOutcome::Applied]);

    // Replaying the same guarded transfer fails and changes nothing.
    let outcomes = store.apply_transactions(&transfer, WriteMode::Normal).unwrap();
    assert_eq!(outcomes, vec![ApplyOutcome::PreconditionFailed]);
    assert_eq!(
        store.read(&["/balance"]),
        json!({"balance": {"a": 0, "b": 10}})
    );
}

#[test]
fn batch_outcomes_follow_submission_order() {
    let store = store();
    let outcomes = store
        .apply_transactions(
            &json!([
                [{"/a": 1}],
                [{"/b": 2}, {"/a": {"oldEmpty": true}}],
                [{"/reconfigure/members": []}],
                "not-a-transaction",
                [{"/c": 3}]
            ]),
            WriteMode::Normal,
        )
        .unwrap();
    assert_eq!(
        outcomes,
        vec![
            ApplyOutcome::Applied,
            ApplyOutcome::PreconditionFailed,
            ApplyOutcome::Forbidden,
            ApplyOutcome::Failed,
            ApplyOutcome::Applied,
        ]
    );
    assert_eq!(store.read(&["/"]), json!({"a": 1, "c": 3}));
}

#[test]
fn erase_behaves_like_delete() {
    let store = store();
    store
        .apply_transactions(&json!([[{"/a/b": 1, "/a/c": 2}]]), WriteMode::Normal)
        .unwrap();
    let outcomes = store
        .apply_transactions(
            &json!([[{"/a/b": {"op": "erase"}}], [{"/missing": {"op": "erase"}}]]),
            WriteMode::Normal,
        )
        .unwrap();
    assert_eq!(outcomes, vec![ApplyOutcome::Applied, ApplyOutcome::Applied]);
    assert_eq!(store.read(&["/a"]), json!({"a": {"c": 2}}));
}

#[test]
fn replace_skips_absent_targets() {
    let store = store();
    store
        .apply_transactions(
            &json!([[{"/present": 1}], [{
                "/present": {"op": "replace", "new": 2},
                "/absent": {"op": "replace", "new": 3}
            }]]),
            WriteMode::Normal,
        )
        .unwrap();
    assert_eq!(store.read(&["/"]), json!({"present": 2}));
}

#[test]
fn unknown_ops_do_not_fail_their_transaction() {
    let store = store();
    let outcomes = store
        .apply_transactions(
            &json!([[{"/a": {"op": "frobnicate", "new": 1}, "/b": 2}]]),
            WriteMode::Normal,
        )
        .unwrap();
    assert_eq!(outcomes, vec![ApplyOutcome::Applied]);
    assert!(!store.has("/a"));
    assert_eq!(store.read(&["/b"]), json!({"b": 2}));
}

#[test]
fn failed_increment_skips_only_its_key() {
    let store = store();
    store
        .apply_transactions(&json!([[{"/text": "hello"}]]), WriteMode::Normal)
        .unwrap();
    let outcomes = store
        .apply_transactions(
            &json!([[{"/text": {"op": "increment"}, "/count": {"op": "increment"}}]]),
            WriteMode::Normal,
        )
        .unwrap();
    assert_eq!(outcomes, vec![ApplyOutcome::Applied]);
    assert_eq!(store.read(&["/"]), json!({"text": "hello", "count": 1}));
}

#[test]
fn decrement_with_the_minimum_step_saturates() {
    let store = store();
    let outcomes = store
        .apply_transactions(
            &json!([[{"/n": {"op": "decrement", "step": i64::MIN}}]]),
            WriteMode::Normal,
        )
        .unwrap();
    assert_eq!(outcomes, vec![ApplyOutcome::Applied]);
    assert_eq!(store.read(&["/n"]), json!({"n": i64::MAX}));
}

#[test]
fn writing_through_a_leaf_replaces_it() {
    let store = store();
    store
        .apply_transactions(&json!([[{"/a": 5}]]), WriteMode::Normal)
        .unwrap();
    store
        .apply_transactions(&json!([[{"/a/b/c": 1}]]), WriteMode::Normal)
        .unwrap();
    assert_eq!(store.read(&["/a"]), json!({"a": {"b": {"c": 1}}}));
}

#[test]
fn client_id_is_carried_but_does_not_affect_semantics() {
    let store = store();
    let outcomes = store
        .apply_transactions(
            &json!([[{"/a": 1}, {}, "client-77"], [{"/b": 2}, {"/a": {"oldEmpty": true}}, "client-78"]]),
            WriteMode::Normal,
        )
        .unwrap();
    assert_eq!(
        outcomes,
        vec![ApplyOutcome::Applied, ApplyOutcome::PreconditionFailed]
    );
}
