/// Default capacity of the broadcast channels that fan change batches out to
/// subscriptions. A subscription that falls further behind than this degrades
/// to a full recompute instead of failing.
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 128;

/// Prefix for all prometheus metrics registered by this crate.
pub(crate) const METRICS_NAMESPACE: &str = "graphfeed";
