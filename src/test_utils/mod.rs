//! Shared helpers for unit tests.

use std::sync::Arc;

use crate::datastore::Datastore;
use crate::datastore::MemorySource;

/// Builds a datastore over an in-memory source seeded with
/// `(fqid, json-object)` pairs. The invalidator task is not started; tests
/// that exercise the change feed call `datastore.start` themselves.
pub(crate) fn dataset(objects: &[(&str, &str)]) -> (Arc<MemorySource>, Arc<Datastore>) {
    let source =
        Arc::new(MemorySource::from_objects(objects.iter().copied()).expect("dataset is valid"));
    let datastore = Datastore::new(Arc::clone(&source) as Arc<dyn crate::datastore::Source>);
    (source, datastore)
}
