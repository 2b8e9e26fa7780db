//! The field types of the query tree.
//!
//! Each request body is a root `(collection, ids, fields)`; every non-leaf
//! field carries a descriptor saying how its value redirects to further
//! objects. Together the fields form a tree starting at the body. Decoding
//! dispatches on the `"type"` attribute of each node and validates the shape
//! before any datastore access happens.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::Accumulator;
use crate::errors::DataStoreError;
use crate::errors::InvalidError;
use crate::errors::JsonError;
use crate::key::Key;
use crate::key::RE_COLLECTION;
use crate::key::RE_FIELD;
use crate::Error;
use crate::Result;

const FT_RELATION: &str = "relation";
const FT_RELATION_LIST: &str = "relation-list";
const FT_GENERIC_RELATION: &str = "generic-relation";
const FT_GENERIC_RELATION_LIST: &str = "generic-relation-list";
const FT_TEMPLATE: &str = "template";

/// Map from field name to its descriptor; `None` is a Leaf.
pub(crate) type FieldsMap = HashMap<String, Option<Arc<FieldDescription>>>;

/// One non-leaf node of the query tree.
#[derive(Debug, PartialEq)]
pub(crate) enum FieldDescription {
    /// The value is a single id in `collection`.
    Relation {
        collection: String,
        fields: FieldsMap,
    },
    /// The value is a list of ids in `collection`.
    RelationList {
        collection: String,
        fields: FieldsMap,
    },
    /// The value is a `collection/id` string carrying its own collection.
    GenericRelation { fields: FieldsMap },
    /// The value is a list of `collection/id` strings.
    GenericRelationList { fields: FieldsMap },
    /// The field name contains a `$` placeholder; the value lists the
    /// replacements that materialize concrete peer fields.
    Template { values: Option<Arc<FieldDescription>> },
}

/// One root of the query tree: which ids of which collection, with which
/// fields, the client requests.
#[derive(Debug)]
pub(crate) struct Body {
    pub(crate) collection: String,
    pub(crate) ids: Vec<u32>,
    pub(crate) fields: FieldsMap,
}

impl Body {
    pub(crate) fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(attributes) = value else {
            return Err(JsonError::custom("request body must be an object").into());
        };

        let ids = decode_ids(attributes.get("ids"))?;
        if ids.is_empty() {
            return Err(InvalidError::new("no ids").into());
        }
        for &id in &ids {
            if id <= 0 {
                return Err(InvalidError::new("id has to be a positive number").into());
            }
        }

        let collection = match attributes.get("collection") {
            None | Some(Value::Null) => {
                return Err(InvalidError::new("attribute collection is missing").into());
            }
            Some(Value::String(collection)) if collection.is_empty() => {
                return Err(InvalidError::new("attribute collection is missing").into());
            }
            Some(Value::String(collection)) => collection.clone(),
            Some(_) => {
                return Err(JsonError::custom("attribute collection must be a string").into());
            }
        };

        let fields = match attributes.get("fields") {
            None | Some(Value::Null) => {
                return Err(InvalidError::new("attribute fields is missing").into());
            }
            Some(value) => decode_fields_map(value)?,
        };

        if !RE_COLLECTION.is_match(&collection) {
            return Err(InvalidError::new("invalid collection name").into());
        }

        Ok(Body {
            collection,
            ids: ids.into_iter().map(|id| id as u32).collect(),
            fields,
        })
    }

    /// Seeds the accumulator with one entry per requested id and field.
    pub(crate) fn seed(&self, acc: &mut Accumulator) {
        for &id in &self.ids {
            acc.add_fields(&self.collection, id, &self.fields);
        }
    }
}

fn decode_ids(value: Option<&Value>) -> Result<Vec<i64>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(JsonError::custom("attribute ids must be an array").into()),
    };

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item {
            // A JSON null leaves the id at its zero value.
            Value::Null => ids.push(0),
            Value::Number(n) => match n.as_i64() {
                Some(id) if id <= u32::MAX as i64 => ids.push(id),
                _ => return Err(JsonError::custom(format!("id {n} is out of range")).into()),
            },
            _ => return Err(JsonError::custom("ids must contain numbers").into()),
        }
    }
    Ok(ids)
}

pub(crate) fn decode_fields_map(value: &Value) -> Result<FieldsMap> {
    let Value::Object(entries) = value else {
        return Err(JsonError::custom("attribute fields must be an object").into());
    };

    let mut fields = FieldsMap::with_capacity(entries.len());
    for (name, value) in entries {
        if !RE_FIELD.is_match(name) {
            let msg = format!("fieldname {name:?} is not a valid fieldname");
            return Err(InvalidError::new(msg).wrap(name).into());
        }

        let description = match value {
            Value::Null => None,
            Value::Object(_) => {
                Some(decode_field(value).map_err(|err| wrap_field(err, name))?)
            }
            _ => {
                let msg = format!("field {name:?} must be null or an object");
                return Err(JsonError::custom(msg).into());
            }
        };
        fields.insert(name.clone(), description);
    }
    Ok(fields)
}

/// Decodes one descriptor, dispatching on its `"type"` attribute.
fn decode_field(value: &Value) -> Result<Arc<FieldDescription>> {
    let Some(attributes) = value.as_object() else {
        return Err(JsonError::custom("field description must be an object").into());
    };

    let field_type = match attributes.get("type") {
        None | Some(Value::Null) => return Err(InvalidError::new("no type").into()),
        Some(Value::String(t)) if t.is_empty() => return Err(InvalidError::new("no type").into()),
        Some(Value::String(t)) => t.as_str(),
        Some(_) => return Err(JsonError::custom("attribute type must be a string").into()),
    };

    let description = match field_type {
        FT_RELATION => {
            let (collection, fields) = decode_relation(attributes)?;
            FieldDescription::Relation { collection, fields }
        }
        FT_RELATION_LIST => {
            let (collection, fields) = decode_relation(attributes)?;
            FieldDescription::RelationList { collection, fields }
        }
        FT_GENERIC_RELATION => FieldDescription::GenericRelation {
            fields: decode_required_fields(attributes)?,
        },
        FT_GENERIC_RELATION_LIST => FieldDescription::GenericRelationList {
            fields: decode_required_fields(attributes)?,
        },
        FT_TEMPLATE => {
            let values = match attributes.get("values") {
                None | Some(Value::Null) => None,
                Some(inner @ Value::Object(_)) => {
                    Some(decode_field(inner).map_err(|err| wrap_field(err, "template"))?)
                }
                Some(_) => {
                    return Err(JsonError::custom("attribute values must be an object").into());
                }
            };
            FieldDescription::Template { values }
        }
        unknown => {
            return Err(InvalidError::new(format!("unknown type {unknown}")).into());
        }
    };

    Ok(Arc::new(description))
}

fn decode_relation(attributes: &serde_json::Map<String, Value>) -> Result<(String, FieldsMap)> {
    let collection = match attributes.get("collection") {
        None | Some(Value::Null) => return Err(InvalidError::new("no collection").into()),
        Some(Value::String(collection)) if collection.is_empty() => {
            return Err(InvalidError::new("no collection").into());
        }
        Some(Value::String(collection)) => collection.clone(),
        Some(_) => return Err(JsonError::custom("attribute collection must be a string").into()),
    };

    let fields = match attributes.get("fields") {
        None | Some(Value::Null) => return Err(InvalidError::new("no fields").into()),
        Some(value) => decode_fields_map(value)?,
    };

    if !RE_COLLECTION.is_match(&collection) {
        return Err(InvalidError::new("invalid collection name").into());
    }

    Ok((collection, fields))
}

fn decode_required_fields(attributes: &serde_json::Map<String, Value>) -> Result<FieldsMap> {
    match attributes.get("fields") {
        None | Some(Value::Null) => Err(InvalidError::new("no fields").into()),
        Some(value) => decode_fields_map(value),
    }
}

/// Prefixes the field path of schema errors; other error kinds pass through.
fn wrap_field(err: Error, field: &str) -> Error {
    match err {
        Error::Invalid(invalid) => Error::Invalid(invalid.wrap(field)),
        other => other,
    }
}

impl FieldDescription {
    /// Adds the sub-keys requested below `key`, whose current value is
    /// `value`, to the accumulator.
    pub(crate) fn expand(
        &self,
        key: &Key,
        value: &Bytes,
        acc: &mut Accumulator,
    ) -> std::result::Result<(), DataStoreError> {
        match self {
            FieldDescription::Relation { collection, fields } => {
                let id: u32 = decode_value(key, value)?;
                acc.add_fields(collection, id, fields);
            }
            FieldDescription::RelationList { collection, fields } => {
                let ids: Vec<u32> = decode_value(key, value)?;
                for id in ids {
                    acc.add_fields(collection, id, fields);
                }
            }
            FieldDescription::GenericRelation { fields } => {
                let fqid: String = decode_value(key, value)?;
                let (collection, id) = split_fqid(key, &fqid)?;
                acc.add_fields(collection, id, fields);
            }
            FieldDescription::GenericRelationList { fields } => {
                let fqids: Vec<String> = decode_value(key, value)?;
                for fqid in fqids {
                    let (collection, id) = split_fqid(key, &fqid)?;
                    acc.add_fields(collection, id, fields);
                }
            }
            FieldDescription::Template { values } => {
                let replacements: Vec<String> = decode_value(key, value)?;
                for replacement in replacements {
                    let field = key.field.replacen('$', &format!("${replacement}"), 1);
                    acc.add(Key::new(key.collection.clone(), key.id, field), values.clone());
                }
            }
        }
        Ok(())
    }
}

fn decode_value<T>(key: &Key, value: &Bytes) -> std::result::Result<T, DataStoreError>
where T: DeserializeOwned {
    serde_json::from_slice(value).map_err(|source| DataStoreError::ValueDecode {
        key: key.clone(),
        source,
    })
}

fn split_fqid<'a>(key: &Key, fqid: &'a str) -> std::result::Result<(&'a str, u32), DataStoreError> {
    Key::split_fqid(fqid).ok_or_else(|| DataStoreError::InvalidFqid {
        key: key.clone(),
        fqid: fqid.to_string(),
    })
}
