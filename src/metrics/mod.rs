
use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;

use crate::constants::METRICS_NAMESPACE;

lazy_static! {
    /// Number of keys currently held by the value cache.
    pub static ref DATASTORE_CACHE_KEY_LEN: IntGauge = IntGauge::with_opts(Opts::new(
        "datastore_cache_key_len",
        "Number of keys in the process-wide value cache"
    ))
    .expect("metric can not be created");

    /// Aggregate byte size of all cached values.
    pub static ref DATASTORE_CACHE_SIZE: IntGauge = IntGauge::with_opts(Opts::new(
        "datastore_cache_size",
        "Aggregate byte size of cached values"
    ))
    .expect("metric can not be created");

    /// Batched get calls answered by the datastore.
    pub static ref DATASTORE_GET_CALLS: IntCounter = IntCounter::with_opts(Opts::new(
        "datastore_get_calls",
        "Batched get calls answered by the datastore"
    ))
    .expect("metric can not be created");

    /// Batched reads that had to consult the external source.
    pub static ref DATASTORE_SOURCE_HITS: IntCounter = IntCounter::with_opts(Opts::new(
        "datastore_source_hits",
        "Reads that missed the cache and hit the external source"
    ))
    .expect("metric can not be created");

    /// Currently open subscriptions.
    pub static ref CONNECTION_COUNT: IntGauge = IntGauge::with_opts(Opts::new(
        "connection_count",
        "Currently open subscriptions"
    ))
    .expect("metric can not be created");

    pub static ref CUSTOM_REGISTRY: Registry =
        Registry::new_custom(Some(METRICS_NAMESPACE.to_string()), None)
            .expect("registry can be created");
}

/// Registers all graphfeed metrics on the given registry. Exposing the
/// registry over HTTP is left to the embedding server.
pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(DATASTORE_CACHE_KEY_LEN.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DATASTORE_CACHE_SIZE.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DATASTORE_GET_CALLS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DATASTORE_SOURCE_HITS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CONNECTION_COUNT.clone()))
        .expect("collector can be registered");
}
