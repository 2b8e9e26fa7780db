//! End-to-end scenarios: parse a request, expand it against a dataset and
//! compare the emitted key/value map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use graphfeed::Autoupdate;
use graphfeed::Connection;
use graphfeed::Datastore;
use graphfeed::Key;
use graphfeed::KeysBuilder;
use graphfeed::MemorySource;
use graphfeed::RestrictAllowed;
use graphfeed::Source;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;

const DATASET: &[(&str, &str)] = &[
    ("user/1", r#"{"id": 1}"#),
    (
        "a/1",
        r#"{"a": "a1", "title": "a1", "b_id": 1, "c_ids": [], "ga_ids": [1, 2]}"#,
    ),
    (
        "a/2",
        r#"{"a": "a2", "title": "a2", "c_ids": [1, 2], "ga_ids": []}"#,
    ),
    (
        "b/1",
        r#"{"b": "b1", "title": "b1", "a_id": 1, "c_ids": [1], "gb_id": 1, "b_children_ids": [2], "d_ids": [1]}"#,
    ),
    (
        "b/2",
        r#"{"b": "b2", "title": "b2", "c_ids": [1, 2], "b_parent_id": 1, "b_children_ids": [], "d_ids": [1, 2]}"#,
    ),
    (
        "c/1",
        r#"{"c": "c1", "title": "c1", "a_id": 2, "b_ids": [1, 2], "ga_ids": [2, 3]}"#,
    ),
    (
        "c/2",
        r#"{"c": "c2", "title": "c2", "a_id": 2, "b_ids": [2], "ga_ids": [2, 3]}"#,
    ),
    (
        "d/1",
        r#"{"d": "d1", "b_$_ids": ["1", "2", "3"], "b_$1_ids": [1, 2], "b_$2_ids": [1], "b_$3_ids": []}"#,
    ),
    (
        "d/2",
        r#"{"d": "d2", "b_$_ids": ["1", "4"], "b_$1_ids": [], "b_$4_ids": [2]}"#,
    ),
    ("ga/1", r#"{"ga": "ga.1", "content_object_ids": ["a/1"]}"#),
    (
        "ga/2",
        r#"{"ga": "ga.2", "content_object_ids": ["a/1", "c/1", "c/2"]}"#,
    ),
    (
        "ga/3",
        r#"{"ga": "ga.3", "content_object_ids": ["c/1", "c/2"]}"#,
    ),
    ("gb/1", r#"{"gb": "gb.1", "content_object_id": "b/1"}"#),
];

struct Stack {
    source: Arc<MemorySource>,
    service: Autoupdate,
    _graceful_tx: watch::Sender<()>,
    graceful_rx: watch::Receiver<()>,
}

fn stack() -> Stack {
    let source =
        Arc::new(MemorySource::from_objects(DATASET.iter().copied()).expect("dataset is valid"));
    let datastore = Datastore::new(Arc::clone(&source) as Arc<dyn Source>);
    let (_graceful_tx, graceful_rx) = watch::channel(());
    datastore.start(graceful_rx.clone());
    let service = Autoupdate::new(datastore, Arc::new(RestrictAllowed));
    Stack {
        source,
        service,
        _graceful_tx,
        graceful_rx,
    }
}

impl Stack {
    fn connect(&self, request: &str) -> Connection {
        let builder = KeysBuilder::from_json(request).expect("request should parse");
        self.service.connect(1, builder, self.graceful_rx.clone())
    }
}

/// Decoded form of one emission: key text to decoded value, gone keys as
/// `None`.
type DecodedEmission = HashMap<String, Option<Value>>;

async fn next_emission(connection: &mut Connection) -> DecodedEmission {
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
                value.map(|raw| serde_json::from_slice(&raw).expect("emitted values are json")),
            )
        })
        .collect()
}

fn expected(json: &str) -> DecodedEmission {
    let values: HashMap<String, Value> = serde_json::from_str(json).expect("expectation is json");
    values
        .into_iter()
        .map(|(key, value)| (key, Some(value)))
        .collect()
}

async fn run_scenario(request: &str, result: &str) {
    let stack = stack();
    let mut connection = stack.connect(request);
    let data = next_emission(&mut connection).await;
    assert_eq!(data, expected(result));
}

#[tokio::test]
async fn test_basic_fan_out() {
    run_scenario(
        r#"{
            "collection": "a",
            "ids": [1, 2],
            "fields": {
                "a": null,
                "c_ids": {
                    "type": "relation-list",
                    "collection": "c",
                    "fields": {
                        "c": null,
                        "ga_ids": {
                            "type": "relation-list",
                            "collection": "ga",
                            "fields": {"ga": null}
                        }
                    }
                },
                "b_id": {
                    "type": "relation",
                    "collection": "b",
                    "fields": {}
                },
                "ga_ids": {
                    "type": "relation-list",
                    "collection": "ga",
                    "fields": {"ga": null}
                }
            }
        }"#,
        r#"{
            "a/1/a": "a1",
            "a/1/c_ids": [],
            "a/1/b_id": 1,
            "a/1/ga_ids": [1, 2],
            "a/2/a": "a2",
            "a/2/c_ids": [1, 2],
            "a/2/ga_ids": [],
            "c/1/c": "c1",
            "c/1/ga_ids": [2, 3],
            "c/2/c": "c2",
            "c/2/ga_ids": [2, 3],
            "ga/1/ga": "ga.1",
            "ga/2/ga": "ga.2",
            "ga/3/ga": "ga.3"
        }"#,
    )
    .await;
}

#[tokio::test]
async fn test_generic_traversal_with_merged_sub_fields() {
    run_scenario(
        r#"{
            "collection": "gb",
            "ids": [1],
            "fields": {
                "content_object_id": {
                    "type": "generic-relation",
                    "fields": {
                        "b_children_ids": {
                            "type": "relation-list",
                            "collection": "b",
                            "fields": {
                                "c_ids": {
                                    "type": "relation-list",
                                    "collection": "c",
                                    "fields": {"c": null}
                                },
                                "b_parent_id": null
                            }
                        },
                        "c_ids": {
                            "type": "relation-list",
                            "collection": "c",
                            "fields": {
                                "c": null,
                                "title": null
                            }
                        },
                        "gb_id": null
                    }
                }
            }
        }"#,
        r#"{
            "b/1/b_children_ids": [2],
            "b/1/c_ids": [1],
            "b/1/gb_id": 1,
            "b/2/c_ids": [1, 2],
            "b/2/b_parent_id": 1,
            "gb/1/content_object_id": "b/1",
            "c/1/c": "c1",
            "c/1/title": "c1",
            "c/2/c": "c2"
        }"#,
    )
    .await;
}

#[tokio::test]
async fn test_non_existent_ids_remain_absent() {
    run_scenario(
        r#"{
            "collection": "ga",
            "ids": [2, 4],
            "fields": {
                "content_object_ids": {
                    "type": "generic-relation-list",
                    "fields": {
                        "a": null,
                        "b": null,
                        "not_existent": {
                            "type": "generic-relation",
                            "fields": {"key": null}
                        },
                        "title": null,
                        "ga_ids": null,
                        "a_id": null
                    }
                }
            }
        }"#,
        r#"{
            "ga/2/content_object_ids": ["a/1", "c/1", "c/2"],
            "a/1/a": "a1",
            "a/1/title": "a1",
            "a/1/ga_ids": [1, 2],
            "c/1/title": "c1",
            "c/1/a_id": 2,
            "c/1/ga_ids": [2, 3],
            "c/2/title": "c2",
            "c/2/a_id": 2,
            "c/2/ga_ids": [2, 3]
        }"#,
    )
    .await;
}

#[tokio::test]
async fn test_template_with_leaf_inner() {
    run_scenario(
        r#"{
            "collection": "d",
            "ids": [1, 2],
            "fields": {
                "d": null,
                "b_$_ids": null
            }
        }"#,
        r#"{
            "d/1/d": "d1",
            "d/1/b_$_ids": ["1", "2", "3"],
            "d/2/d": "d2",
            "d/2/b_$_ids": ["1", "4"]
        }"#,
    )
    .await;
}

#[tokio::test]
async fn test_template_descriptor_synthesizes_fields() {
    run_scenario(
        r#"{
            "collection": "d",
            "ids": [1, 2],
            "fields": {
                "d": null,
                "b_$_ids": {"type": "template"}
            }
        }"#,
        r#"{
            "d/1/d": "d1",
            "d/1/b_$_ids": ["1", "2", "3"],
            "d/1/b_$1_ids": [1, 2],
            "d/1/b_$2_ids": [1],
            "d/1/b_$3_ids": [],
            "d/2/d": "d2",
            "d/2/b_$_ids": ["1", "4"],
            "d/2/b_$1_ids": [],
            "d/2/b_$4_ids": [2]
        }"#,
    )
    .await;
}

#[tokio::test]
async fn test_structured_references_through_a_template() {
    run_scenario(
        r#"{
            "collection": "d",
            "ids": [1, 2],
            "fields": {
                "b_$_ids": {
                    "type": "template",
                    "values": {
                        "type": "relation-list",
                        "collection": "b",
                        "fields": {"b": null}
                    }
                },
                "b_$4_ids": {
                    "type": "relation-list",
                    "collection": "b",
                    "fields": {"title": null}
                }
            }
        }"#,
        r#"{
            "d/1/b_$_ids": ["1", "2", "3"],
            "d/1/b_$1_ids": [1, 2],
            "d/1/b_$2_ids": [1],
            "d/1/b_$3_ids": [],
            "d/2/b_$_ids": ["1", "4"],
            "d/2/b_$1_ids": [],
            "d/2/b_$4_ids": [2],
            "b/1/b": "b1",
            "b/2/b": "b2",
            "b/2/title": "b2"
        }"#,
    )
    .await;
}

#[tokio::test]
async fn test_multi_request_unions_both_bodies() {
    run_scenario(
        r#"[
            {"collection": "a", "ids": [1], "fields": {"a": null}},
            {"collection": "b", "ids": [1], "fields": {"b": null}}
        ]"#,
        r#"{
            "a/1/a": "a1",
            "b/1/b": "b1"
        }"#,
    )
    .await;
}

#[tokio::test]
async fn test_expansion_is_deterministic_across_stacks() {
    let request = r#"{
        "collection": "a",
        "ids": [1, 2],
        "fields": {
            "c_ids": {
                "type": "relation-list",
                "collection": "c",
                "fields": {
                    "ga_ids": {
                        "type": "relation-list",
                        "collection": "ga",
                        "fields": {"ga": null}
                    }
                }
            }
        }
    }"#;

    let first_stack = stack();
    let mut first = first_stack.connect(request);
    let second_stack = stack();
    let mut second = second_stack.connect(request);
    assert_eq!(
        next_emission(&mut first).await,
        next_emission(&mut second).await
    );
}

#[tokio::test]
async fn test_change_emits_only_the_diff() {
    let stack = stack();
    let mut connection = stack.connect(
        r#"{
            "collection": "a",
            "ids": [2],
            "fields": {
                "c_ids": {
                    "type": "relation-list",
                    "collection": "c",
                    "fields": {"c": null}
                }
            }
        }"#,
    );
    let initial = next_emission(&mut connection).await;
    assert_eq!(
        initial,
        expected(r#"{"a/2/c_ids": [1, 2], "c/1/c": "c1", "c/2/c": "c2"}"#)
    );

    // Shrinking the pivot drops c/2 from the view.
    stack
        .source
        .set(Key::new("a", 2, "c_ids"), Bytes::from_static(b"[1]"));

    let diff = next_emission(&mut connection).await;
    let mut expected_diff = expected(r#"{"a/2/c_ids": [1]}"#);
    expected_diff.insert("c/2/c".to_string(), None);
    assert_eq!(diff, expected_diff);
}

#[tokio::test]
async fn test_unchanged_data_yields_no_emission() {
    let stack = stack();
    let mut connection = stack.connect(
        r#"{"collection": "a", "ids": [1], "fields": {"a": null, "title": null}}"#,
    );
    next_emission(&mut connection).await;

    // Rewriting the same bytes advances the feed but changes nothing.
    stack
        .source
        .set(Key::new("a", 1, "a"), Bytes::from_static(b"\"a1\""));

    assert!(
        timeout(Duration::from_millis(50), connection.next())
            .await
            .is_err(),
        "re-emitting after an effective no-op change must yield nothing"
    );
}
