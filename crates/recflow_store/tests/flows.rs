//! End-to-end programs run against the in-memory store.

use proptest::prelude::*;
use recflow_core::{Bag, FlowError, Flow, Slot, TransactionConfig};
use recflow_protocol::{
    AppId, DeleteTarget, Record, RecordId, RecordQuery, Revision, UpdateKey, UpdateTarget,
};
use recflow_store::MemoryStore;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const APP: &str = "1";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn app() -> AppId {
    AppId::from(APP)
}

fn seeded(records: &[(&str, &str)]) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for (field1, field2) in records {
        store.seed(
            APP,
            Record::new()
                .with_field("field1", *field1)
                .with_field("field2", *field2),
        );
    }
    Arc::new(store)
}

#[tokio::test]
async fn transactional_create_yields_none_and_persists_one_record() {
    init_tracing();
    let store = seeded(&[]);

    let result = Flow::instance(Arc::clone(&store))
        .create("r1", APP, Record::new().with_field("field1", "x"))
        .commit_transactional(|mut bag| bag.remove("r1"))
        .await
        .unwrap();

    assert_eq!(result, Some(Slot::Record(None)));
    let records = store.records(&app());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("field1"), Some(&json!("x")));
    assert_eq!(store.stats().bulk_applied, 1);
}

#[tokio::test]
async fn projection_returns_only_listed_fields() {
    init_tracing();
    let store = seeded(&[("x", "y")]);

    let records = Flow::instance(store)
        .read_many("r", RecordQuery::new(APP).with_fields(["field1"]))
        .commit_transactional(|bag| bag.records("r").map(<[Record]>::to_vec))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, None);
    assert_eq!(record.revision, None);
    assert_eq!(record.fields.len(), 1);
    assert_eq!(record.field("field1"), Some(&json!("x")));
}

#[tokio::test]
async fn missing_record_reads_as_none_in_both_modes() {
    init_tracing();
    let store = seeded(&[]);

    let auto = Flow::instance(Arc::clone(&store))
        .read_one("r", APP, "404")
        .commit(|bag| bag.get("r").cloned())
        .await
        .unwrap();
    let tx = Flow::instance(store)
        .read_one("r", APP, "404")
        .commit_transactional(|bag| bag.get("r").cloned())
        .await
        .unwrap();

    assert_eq!(auto, Some(Slot::Record(None)));
    assert_eq!(tx, auto);
}

#[tokio::test]
async fn read_modify_write_commits_with_observed_revision() {
    init_tracing();
    let store = seeded(&[("x", "y")]);

    Flow::instance(Arc::clone(&store))
        .read_one("current", APP, "1")
        .chain("saved", |bag| {
            let next = bag
                .record("current")
                .cloned()
                .unwrap_or_default()
                .with_field("field1", "updated");
            recflow_core::Program::update(app(), next, UpdateTarget::id("1"), None)
                .map(|_| Slot::Record(None))
        })
        .commit_transactional(|_| ())
        .await
        .unwrap();

    let stored = store.peek(&app(), &RecordId::from("1")).unwrap();
    assert_eq!(stored.field("field1"), Some(&json!("updated")));
    assert_eq!(stored.revision, Some(Revision::from("2")));
}

#[tokio::test]
async fn transaction_rejects_writes_to_unread_records() {
    init_tracing();
    let store = seeded(&[("x", "y"), ("z", "w")]);

    let update = Flow::instance(Arc::clone(&store))
        .create("new", APP, Record::new().with_field("field1", "n"))
        .update_by_id("u", APP, "1", Record::new().with_field("field1", "q"))
        .commit_transactional(|_| ())
        .await
        .unwrap_err();
    assert!(matches!(update, FlowError::ReadBeforeWrite { .. }));

    let delete = Flow::instance(Arc::clone(&store))
        .read_one("one", APP, "1")
        .delete(APP, vec![DeleteTarget::new("1"), DeleteTarget::new("2")])
        .commit_transactional(|_| ())
        .await
        .unwrap_err();
    match delete {
        FlowError::UnresolvedDelete { ids, .. } => assert_eq!(ids, vec![RecordId::from("2")]),
        other => panic!("unexpected error: {other}"),
    }

    // Neither execution wrote anything, not even the staged create.
    assert_eq!(store.len(&app()), 2);
    assert_eq!(store.stats().bulk_applied, 0);
    assert_eq!(store.stats().writes, 0);
}

#[tokio::test]
async fn second_write_to_a_record_aborts_locally() {
    init_tracing();
    let store = seeded(&[("x", "y")]);

    let twice = Flow::instance(Arc::clone(&store))
        .read_one("current", APP, "1")
        .update_by_id("first", APP, "1", Record::new().with_field("field1", "one"))
        .update_by_id("second", APP, "1", Record::new().with_field("field1", "two"))
        .commit_transactional(|_| ())
        .await
        .unwrap_err();
    assert!(matches!(twice, FlowError::AlreadyWritten { .. }));
    assert!(twice.is_local());
    assert!(!twice.is_conflict());

    let then_delete = Flow::instance(Arc::clone(&store))
        .read_one("current", APP, "1")
        .update_by_id("first", APP, "1", Record::new().with_field("field1", "one"))
        .delete(APP, vec![DeleteTarget::new("1")])
        .commit_transactional(|_| ())
        .await
        .unwrap_err();
    assert!(matches!(then_delete, FlowError::AlreadyWritten { .. }));

    let stored = store.peek(&app(), &RecordId::from("1")).unwrap();
    assert_eq!(stored.field("field1"), Some(&json!("x")));
    assert_eq!(stored.revision, Some(Revision::from("1")));
    assert_eq!(store.stats().bulk_applied, 0);
    assert_eq!(store.stats().bulk_rejected, 0);
}

#[tokio::test]
async fn auto_commit_accepts_caller_supplied_targets() {
    init_tracing();
    let store = seeded(&[("x", "y"), ("z", "w")]);

    Flow::instance(Arc::clone(&store))
        .update_by_id("u", APP, "1", Record::new().with_field("field1", "q"))
        .delete(APP, vec![DeleteTarget::new("2")])
        .commit(|_| ())
        .await
        .unwrap();

    assert_eq!(store.len(&app()), 1);
    let stored = store.peek(&app(), &RecordId::from("1")).unwrap();
    assert_eq!(stored.field("field1"), Some(&json!("q")));
}

#[tokio::test]
async fn auto_commit_keeps_earlier_writes_on_failure() {
    init_tracing();
    let store = seeded(&[("x", "y")]);

    let err = Flow::instance(Arc::clone(&store))
        .create("new", APP, Record::new().with_field("field1", "kept"))
        .update(
            "stale",
            APP,
            Record::new().with_field("field1", "lost"),
            UpdateTarget::id("1"),
            Some(Revision::from("99")),
        )
        .commit(|_| ())
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(store.len(&app()), 2);
    let original = store.peek(&app(), &RecordId::from("1")).unwrap();
    assert_eq!(original.field("field1"), Some(&json!("x")));
}

#[tokio::test]
async fn update_by_key_within_transaction() {
    init_tracing();
    let store = seeded(&[("A-1", "open"), ("A-2", "open")]);

    Flow::instance(Arc::clone(&store))
        .read_many("all", RecordQuery::new(APP))
        .update_by_key(
            "closed",
            APP,
            UpdateKey::new("field1", "A-2"),
            Record::new().with_field("field2", "closed"),
        )
        .commit_transactional(|_| ())
        .await
        .unwrap();

    let stored = store.peek(&app(), &RecordId::from("2")).unwrap();
    assert_eq!(stored.field("field2"), Some(&json!("closed")));
    assert_eq!(stored.field("field1"), Some(&json!("A-2")));
    let untouched = store.peek(&app(), &RecordId::from("1")).unwrap();
    assert_eq!(untouched.field("field2"), Some(&json!("open")));
}

#[tokio::test]
async fn bulk_limit_aborts_before_writing() {
    init_tracing();
    let store = seeded(&[]);

    let mut flow = Flow::with_config(
        Arc::clone(&store),
        TransactionConfig::new().with_max_bulk_requests(3),
    );
    for i in 0..4 {
        flow = flow.create(format!("r{i}"), APP, Record::new().with_field("n", i));
    }
    let err = flow.commit_transactional(|_| ()).await.unwrap_err();

    assert!(matches!(err, FlowError::BulkLimitExceeded { count: 4, limit: 3 }));
    assert!(store.is_empty(&app()));
}

#[tokio::test]
async fn transform_runs_between_store_operations() {
    init_tracing();
    let store = seeded(&[("x", "y")]);

    let bag: Bag = Flow::instance(store)
        .read_one("r", APP, "1")
        .transform("r", |current| async move {
            let field = current
                .and_then(Slot::into_record)
                .and_then(|r| r.field("field1").cloned())
                .unwrap_or_default();
            Ok::<_, FlowError>(Slot::Value(field))
        })
        .read_many("after", RecordQuery::new(APP).with_total_count())
        .commit_transactional(|bag| bag)
        .await
        .unwrap();

    assert_eq!(bag.value("r"), Some(&json!("x")));
    assert_eq!(
        bag.get("after").and_then(Slot::as_page).and_then(|p| p.total_count),
        Some(1)
    );
}

#[derive(Debug, Clone)]
enum Read {
    One(u8),
    Many(Option<&'static str>, bool),
}

fn read_strategy() -> impl Strategy<Value = Read> {
    prop_oneof![
        (0u8..8).prop_map(Read::One),
        (
            prop::sample::select(vec![
                None,
                Some(r#"field2 = "a""#),
                Some(r#"field2 != "a""#),
                Some("limit 2"),
                Some(r#"field2 = "b" offset 1"#),
            ]),
            any::<bool>(),
        )
            .prop_map(|(q, projected)| Read::Many(q, projected)),
    ]
}

fn build(store: Arc<MemoryStore>, reads: &[Read]) -> Flow<MemoryStore> {
    reads
        .iter()
        .enumerate()
        .fold(Flow::instance(store), |flow, (i, read)| match read {
            Read::One(id) => flow.read_one(format!("t{i}"), APP, u64::from(*id)),
            Read::Many(q, projected) => {
                let mut query = RecordQuery::new(APP);
                if let Some(q) = q {
                    query = query.with_query(*q);
                }
                if *projected {
                    query = query.with_fields(["field2"]);
                }
                flow.read_many(format!("t{i}"), query)
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn read_only_programs_agree_across_modes(
        rows in prop::collection::vec(prop::sample::select(vec!["a", "b"]), 0..6),
        reads in prop::collection::vec(read_strategy(), 0..6),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let pairs: Vec<(&str, &str)> = rows.iter().map(|v| ("f", *v)).collect();
        let store = seeded(&pairs);

        let (auto, tx) = runtime.block_on(async {
            let auto = build(Arc::clone(&store), &reads).commit(|bag| bag).await;
            let tx = build(Arc::clone(&store), &reads).commit_transactional(|bag| bag).await;
            (auto, tx)
        });

        prop_assert_eq!(auto.unwrap(), tx.unwrap());
        prop_assert_eq!(store.stats().bulk_applied, 0);
    }
}
