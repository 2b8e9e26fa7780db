use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_test::traced_test;

use super::Autoupdate;
use super::Connection;
use crate::datastore::ChangeBatch;
use crate::datastore::Datastore;
use crate::datastore::MemorySource;
use crate::datastore::Source;
use crate::errors::DataStoreError;
use crate::key::Key;
use crate::keysbuilder::KeysBuilder;
use crate::restrict::RestrictAllowed;
use crate::restrict::Restricter;
use crate::Error;
use crate::Result;

struct Scenario {
    source: Arc<MemorySource>,
    graceful_tx: watch::Sender<()>,
    graceful_rx: watch::Receiver<()>,
    service: Autoupdate,
}

fn scenario(objects: &[(&str, &str)]) -> Scenario {
    let source =
        Arc::new(MemorySource::from_objects(objects.iter().copied()).expect("dataset is valid"));
    let datastore = Datastore::new(Arc::clone(&source) as Arc<dyn Source>);
    let (graceful_tx, graceful_rx) = watch::channel(());
    datastore.start(graceful_rx.clone());
    let service = Autoupdate::new(datastore, Arc::new(RestrictAllowed));
    Scenario {
        source,
        graceful_tx,
        graceful_rx,
        service,
    }
}

impl Scenario {
    fn connect(&self, request: &str) -> Connection {
        let builder = KeysBuilder::from_json(request).expect("request should parse");
        self.service.connect(1, builder, self.graceful_rx.clone())
    }
}

async fn next_map(connection: &mut Connection) -> HashMap<String, Option<String>> {
    let emission = timeout(Duration::from_secs(1), connection.next())
        .await
        .expect("next should not block")
        .expect("next should not fail")
        .expect("connection should stay open");
    emission
        .into_iter()
        .map(|(key, value)| {
            (
                key.to_string(),
                value.map(|v| String::from_utf8(v.to_vec()).expect("values are utf-8")),
            )
        })
        .collect()
}

fn expect_map(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.map(str::to_string)))
        .collect()
}

const REQUEST: &str = r#"{
    "collection": "a",
    "ids": [1],
    "fields": {
        "a": null,
        "b_id": {
            "type": "relation",
            "collection": "b",
            "fields": {"b": null}
        }
    }
}"#;

#[tokio::test]
async fn test_first_emission_is_the_full_view() {
    let scenario = scenario(&[
        ("a/1", r#"{"a": "a1", "b_id": 1}"#),
        ("b/1", r#"{"b": "b1"}"#),
    ]);
    let mut connection = scenario.connect(REQUEST);

    let data = next_map(&mut connection).await;
    assert_eq!(
        data,
        expect_map(&[
            ("a/1/a", Some("\"a1\"")),
            ("a/1/b_id", Some("1")),
            ("b/1/b", Some("\"b1\"")),
        ])
    );
}

#[tokio::test]
async fn test_diff_contains_only_the_changed_key() {
    let scenario = scenario(&[
        ("a/1", r#"{"a": "a1", "b_id": 1}"#),
        ("b/1", r#"{"b": "b1"}"#),
    ]);
    let mut connection = scenario.connect(REQUEST);
    next_map(&mut connection).await;

    scenario
        .source
        .set(Key::new("b", 1, "b"), Bytes::from_static(b"\"changed\""));

    let data = next_map(&mut connection).await;
    assert_eq!(data, expect_map(&[("b/1/b", Some("\"changed\""))]));
}

#[tokio::test]
async fn test_removed_key_is_emitted_as_null() {
    let scenario = scenario(&[
        ("a/1", r#"{"a": "a1", "b_id": 1}"#),
        ("b/1", r#"{"b": "b1"}"#),
    ]);
    let mut connection = scenario.connect(REQUEST);
    next_map(&mut connection).await;

    scenario.source.remove(Key::new("b", 1, "b"));

    let data = next_map(&mut connection).await;
    assert_eq!(data, expect_map(&[("b/1/b", None)]));
}

#[tokio::test]
async fn test_pivot_change_reshapes_the_view() {
    let scenario = scenario(&[
        ("a/1", r#"{"a": "a1", "b_id": 1}"#),
        ("b/1", r#"{"b": "b1"}"#),
        ("b/2", r#"{"b": "b2"}"#),
    ]);
    let mut connection = scenario.connect(REQUEST);
    next_map(&mut connection).await;

    // Repointing the relation drops the old target and pulls in the new one.
    scenario
        .source
        .set(Key::new("a", 1, "b_id"), Bytes::from_static(b"2"));

    let data = next_map(&mut connection).await;
    assert_eq!(
        data,
        expect_map(&[
            ("a/1/b_id", Some("2")),
            ("b/1/b", None),
            ("b/2/b", Some("\"b2\"")),
        ])
    );
}

#[tokio::test]
async fn test_rewriting_the_same_bytes_emits_nothing() {
    let scenario = scenario(&[
        ("a/1", r#"{"a": "a1", "b_id": 1}"#),
        ("b/1", r#"{"b": "b1"}"#),
    ]);
    let mut connection = scenario.connect(REQUEST);
    next_map(&mut connection).await;

    scenario
        .source
        .set(Key::new("b", 1, "b"), Bytes::from_static(b"\"b1\""));

    // The cycle runs but the diff is empty, so next keeps waiting.
    assert!(
        timeout(Duration::from_millis(50), connection.next())
            .await
            .is_err(),
        "an empty diff must not be emitted"
    );
}

#[tokio::test]
async fn test_disjoint_changes_do_not_trigger_an_emission() {
    let scenario = scenario(&[
        ("a/1", r#"{"a": "a1", "b_id": 1}"#),
        ("b/1", r#"{"b": "b1"}"#),
        ("unrelated/1", r#"{"x": 1}"#),
    ]);
    let mut connection = scenario.connect(REQUEST);
    next_map(&mut connection).await;

    scenario
        .source
        .set(Key::new("unrelated", 1, "x"), Bytes::from_static(b"2"));

    assert!(
        timeout(Duration::from_millis(50), connection.next())
            .await
            .is_err(),
        "a disjoint change must not trigger an emission"
    );
}

#[tokio::test]
async fn test_queued_changes_are_coalesced_into_one_diff() {
    let scenario = scenario(&[
        ("a/1", r#"{"a": "a1", "b_id": 1}"#),
        ("b/1", r#"{"b": "b1"}"#),
    ]);
    let mut connection = scenario.connect(REQUEST);
    next_map(&mut connection).await;

    // Both batches queue up before the connection runs its next cycle.
    scenario
        .source
        .set(Key::new("a", 1, "a"), Bytes::from_static(b"\"a2\""));
    scenario
        .source
        .set(Key::new("b", 1, "b"), Bytes::from_static(b"\"changed\""));

    let data = next_map(&mut connection).await;
    assert_eq!(
        data,
        expect_map(&[
            ("a/1/a", Some("\"a2\"")),
            ("b/1/b", Some("\"changed\"")),
        ])
    );
}

#[tokio::test]
async fn test_shutdown_before_next_closes_the_connection() {
    let scenario = scenario(&[("a/1", r#"{"a": "a1"}"#)]);
    let mut connection =
        scenario.connect(r#"{"collection": "a", "ids": [1], "fields": {"a": null}}"#);
    next_map(&mut connection).await;

    scenario.graceful_tx.send(()).expect("send should succeed");
    let next = timeout(Duration::from_secs(1), connection.next())
        .await
        .expect("next should return")
        .expect("shutdown is not an error");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_shutdown_while_waiting_closes_the_connection() {
    let scenario = scenario(&[("a/1", r#"{"a": "a1"}"#)]);
    let mut connection =
        scenario.connect(r#"{"collection": "a", "ids": [1], "fields": {"a": null}}"#);
    next_map(&mut connection).await;

    let handle = tokio::spawn(async move { connection.next().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    scenario.graceful_tx.send(()).expect("send should succeed");

    let next = timeout(Duration::from_secs(1), handle)
        .await
        .expect("next should return")
        .expect("task should not panic")
        .expect("shutdown is not an error");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_restriction_error_surfaces_to_the_consumer() {
    let source = Arc::new(
        MemorySource::from_objects([("meeting/3", r#"{"name": "broken", "user_ids": "oops"}"#)])
            .expect("dataset is valid"),
    );
    let datastore = Datastore::new(Arc::clone(&source) as Arc<dyn Source>);
    let (_graceful_tx, graceful_rx) = watch::channel(());
    datastore.start(graceful_rx.clone());
    let service = Autoupdate::new(datastore, Arc::new(Restricter::new()));

    let builder = KeysBuilder::from_json(
        r#"{"collection": "meeting", "ids": [3], "fields": {"name": null}}"#,
    )
    .expect("request should parse");
    let mut connection = service.connect(1, builder, graceful_rx);

    let err = timeout(Duration::from_secs(1), connection.next())
        .await
        .expect("next should return")
        .expect_err("restriction must fail closed");
    assert!(matches!(err, Error::Restriction(_)), "got: {err}");
}

/// Source that can be switched into a failing state.
struct FlakySource {
    inner: MemorySource,
    failing: AtomicBool,
}

#[async_trait]
impl Source for FlakySource {
    async fn get(&self, keys: &[Key]) -> Result<HashMap<Key, Option<Bytes>>> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(DataStoreError::Source("flaky source is down".to_string()).into());
        }
        self.inner.get(keys).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.inner.subscribe()
    }
}

#[tokio::test]
#[traced_test]
async fn test_transient_source_error_skips_the_emission() {
    let source = Arc::new(FlakySource {
        inner: MemorySource::from_objects([("a/1", r#"{"a": "a1"}"#)]).expect("dataset is valid"),
        failing: AtomicBool::new(false),
    });
    let datastore = Datastore::new(Arc::clone(&source) as Arc<dyn Source>);
    let (_graceful_tx, graceful_rx) = watch::channel(());
    datastore.start(graceful_rx.clone());
    let service = Autoupdate::new(datastore, Arc::new(RestrictAllowed));

    let builder =
        KeysBuilder::from_json(r#"{"collection": "a", "ids": [1], "fields": {"a": null}}"#)
            .expect("request should parse");
    let mut connection = service.connect(1, builder, graceful_rx);
    next_map(&mut connection).await;

    // The change arrives while the source is down: the cycle fails, nothing
    // is emitted, the subscription stays alive.
    source.failing.store(true, Ordering::Relaxed);
    source
        .inner
        .set(Key::new("a", 1, "a"), Bytes::from_static(b"\"a2\""));
    assert!(
        timeout(Duration::from_millis(50), connection.next())
            .await
            .is_err(),
        "a failed cycle must not emit"
    );
    assert!(logs_contain("cycle failed"));

    // Once the source recovers, the next change triggers a successful cycle.
    source.failing.store(false, Ordering::Relaxed);
    source
        .inner
        .set(Key::new("a", 1, "a"), Bytes::from_static(b"\"a3\""));
    let data = next_map(&mut connection).await;
    assert_eq!(data, expect_map(&[("a/1/a", Some("\"a3\""))]));
}
