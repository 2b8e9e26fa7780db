//! Error hierarchy for the graphfeed core.
//!
//! Errors are categorized by the pipeline stage that produced them: request
//! decoding, request validation, datastore reads, restriction policies and
//! configuration loading.

use crate::key::Key;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed request body
    #[error(transparent)]
    Json(#[from] JsonError),

    /// Structurally well-formed request that violates the request schema
    #[error(transparent)]
    Invalid(#[from] InvalidError),

    /// Read failure against the datastore source
    #[error(transparent)]
    DataStore(#[from] DataStoreError),

    /// Restriction policy failure; always fatal for the current cycle
    #[error(transparent)]
    Restriction(#[from] RestrictionError),

    /// Configuration loading or validation failure
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// Ambient cancellation observed; terminates without being a failure
    #[error("operation cancelled")]
    Cancelled,
}

/// Wrapper for request bodies that are not valid JSON.
///
/// The inner `serde_json` message carries the line and column of the offending
/// byte when known.
#[derive(Debug, thiserror::Error)]
#[error("invalid json: {source}")]
pub struct JsonError {
    #[from]
    source: serde_json::Error,
}

impl JsonError {
    /// A JSON error with a custom message, used where the request has the
    /// wrong JSON type for an attribute (e.g. a number where an array is
    /// expected).
    pub(crate) fn custom(msg: impl std::fmt::Display) -> Self {
        JsonError {
            source: serde::de::Error::custom(msg),
        }
    }
}

/// A request that decoded fine but violates the request schema.
///
/// Carries the path of field names from the root of the query tree to the
/// offending node, so callers can report `field "a.b.c": message`.
#[derive(Debug, Clone)]
pub struct InvalidError {
    msg: String,
    fields: Vec<String>,
}

impl InvalidError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        InvalidError {
            msg: msg.into(),
            fields: Vec::new(),
        }
    }

    /// Prefixes the field path with the name of the parent field.
    pub(crate) fn wrap(mut self, field: &str) -> Self {
        self.fields.insert(0, field.to_string());
        self
    }

    /// The innermost message, without the field path.
    pub fn msg(&self) -> &str {
        &self.msg
    }

    /// Path of field names from the root to the invalid node.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl std::fmt::Display for InvalidError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.fields.is_empty() {
            return write!(f, "{}", self.msg);
        }
        write!(f, "field \"{}\": {}", self.fields.join("."), self.msg)
    }
}

impl std::error::Error for InvalidError {}

#[derive(Debug, thiserror::Error)]
pub enum DataStoreError {
    /// The external source failed to answer a batched read
    #[error("source read failed: {0}")]
    Source(String),

    /// A stored value did not have the shape its descriptor requires
    #[error("decoding value for key {key}: {source}")]
    ValueDecode {
        key: Key,
        #[source]
        source: serde_json::Error,
    },

    /// A generic-relation value that is not of the form `collection/id`
    #[error("key {key}: invalid collection id: {fqid}")]
    InvalidFqid { key: Key, fqid: String },

    /// Key text that does not match the key grammar
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The change feed of the source is gone
    #[error("change feed closed")]
    FeedClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum RestrictionError {
    /// A collection policy failed while deciding visibility for a batch
    #[error("restricting collection {collection} mode {mode}: {reason}")]
    Policy {
        collection: String,
        mode: String,
        reason: String,
    },

    /// A permission helper could not resolve the request user's rights
    #[error("resolving permissions for user {user_id}: {reason}")]
    Permission { user_id: u32, reason: String },
}
