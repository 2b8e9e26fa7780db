//! Canonical datastore identifiers.
//!
//! A [`Key`] addresses one scalar in the datastore as the triple
//! `(collection, id, field)` with the stable textual form
//! `collection/id/field`.


use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::Serializer;

use crate::errors::DataStoreError;

/// Collection names are lowercase words joined by single underscores.
pub(crate) static RE_COLLECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+(_[a-z]+)*$").expect("collection pattern is valid"));

/// Field names are lowercase snake with at most one `$` placeholder, which may
/// be followed by digits (structured fields).
pub(crate) static RE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*\$?[a-z0-9_]*$").expect("field pattern is valid"));

/// Address of one scalar in the datastore.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub collection: String,
    pub id: u32,
    pub field: String,
}

impl Key {
    /// Builds a key from parts that were already validated, e.g. by the query
    /// tree parser or by fqid decoding.
    pub fn new(collection: impl Into<String>, id: u32, field: impl Into<String>) -> Self {
        Key {
            collection: collection.into(),
            id,
            field: field.into(),
        }
    }

    /// The `collection/id` prefix addressing the whole object.
    pub fn fqid(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    /// Splits an fqid of the form `collection/id` as carried by
    /// generic-relation values. Returns `None` when the text does not have
    /// exactly that shape.
    pub(crate) fn split_fqid(fqid: &str) -> Option<(&str, u32)> {
        let (collection, raw_id) = fqid.split_once('/')?;
        if collection.is_empty() {
            return None;
        }
        let id: u32 = raw_id.parse().ok()?;
        if id == 0 {
            return None;
        }
        Some((collection, id))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.collection, self.id, self.field)
    }
}

// Keys order by their textual form, not by numeric id.
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Key {
    type Err = DataStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DataStoreError::InvalidKey(s.to_string());

        let mut parts = s.splitn(3, '/');
        let collection = parts.next().ok_or_else(invalid)?;
        let raw_id = parts.next().ok_or_else(invalid)?;
        let field = parts.next().ok_or_else(invalid)?;

        if !RE_COLLECTION.is_match(collection) {
            return Err(invalid());
        }
        let id: u32 = raw_id.parse().map_err(|_| invalid())?;
        if id == 0 {
            return Err(invalid());
        }
        if !RE_FIELD.is_match(field) {
            return Err(invalid());
        }

        Ok(Key::new(collection, id, field))
    }
}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.collect_str(self)
    }
}
