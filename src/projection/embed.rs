//! Pure operations on embedded child lists.
//!
//! Each function takes the parent's current list and returns the list to
//! write back. Entries are matched by their `id` field.

use serde_json::{Map, Value};

use crate::event::{ID_FIELD, RESOURCE_FIELD};

/// Drop the `resource` tag before a record is embedded.
pub fn strip_resource(mut record: Map<String, Value>) -> Map<String, Value> {
    record.remove(RESOURCE_FIELD);
    record
}

/// Current contents of a list field. Missing or non-array fields read as empty.
pub fn embedded_list(document: &Map<String, Value>, field: &str) -> Vec<Value> {
    match document.get(field) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn entry_id(entry: &Value) -> Option<&str> {
    entry.get(ID_FIELD).and_then(Value::as_str)
}

fn record_id(record: &Map<String, Value>) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// Shallow field merge: every key of `patch` overwrites `target`.
pub fn merge_fields(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

/// New record first, followed by the existing entries.
///
/// With `dedupe`, existing entries carrying the record's id are dropped.
pub fn prepend(list: Vec<Value>, record: &Map<String, Value>, dedupe: bool) -> Vec<Value> {
    let id = record_id(record);
    let mut out = Vec::with_capacity(list.len() + 1);
    out.push(Value::Object(record.clone()));
    out.extend(
        list.into_iter()
            .filter(|entry| !(dedupe && id.is_some() && entry_id(entry) == id)),
    );
    out
}

/// Merge `patch` into the entry with `id`, then move it to the end.
///
/// Fields of the old entry absent from `patch` are preserved. Duplicates of
/// `id` collapse into the single merged entry. When no entry matches,
/// `fallback` (the full current record) is appended instead.
pub fn merge_entry(
    list: Vec<Value>,
    id: &str,
    patch: &Map<String, Value>,
    fallback: &Map<String, Value>,
) -> Vec<Value> {
    let mut merged = list
        .iter()
        .find(|entry| entry_id(entry) == Some(id))
        .and_then(Value::as_object)
        .cloned();

    match merged.as_mut() {
        Some(entry) => merge_fields(entry, patch),
        None => merged = Some(fallback.clone()),
    }

    let mut out = remove_entry(list, id);
    if let Some(entry) = merged {
        out.push(Value::Object(entry));
    }
    out
}

/// Every entry except those with `id`.
pub fn remove_entry(list: Vec<Value>, id: &str) -> Vec<Value> {
    list.into_iter()
        .filter(|entry| entry_id(entry) != Some(id))
        .collect()
}
