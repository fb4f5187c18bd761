//! Shared helpers for integration and behaviour tests.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};

use submission_indexer::bus::TopicsConfig;
use submission_indexer::config::{ConflictRetryConfig, CreatePolicy, IndexConfig};
use submission_indexer::dispatch::Dispatcher;
use submission_indexer::index::IndexClient;
use submission_indexer::projection::Projector;

pub const CREATE: &str = "submission.notification.create";
pub const UPDATE: &str = "submission.notification.update";
pub const DELETE: &str = "submission.notification.delete";
pub const INDEX: &str = "submission-index";

/// Wrap a payload in a well-formed envelope for `topic`.
pub fn envelope(topic: &str, payload: Value) -> Value {
    json!({
        "topic": topic,
        "originator": "submission-api",
        "timestamp": "2018-02-16T00:00:00",
        "mime-type": "application/json",
        "payload": payload
    })
}

/// Index configuration with strict creates and fast conflict retries.
pub fn index_config(policy: CreatePolicy) -> IndexConfig {
    IndexConfig {
        create_policy: policy,
        conflict_retry: ConflictRetryConfig {
            min_delay_ms: 1,
            max_delay_ms: 10,
            max_times: 5,
        },
        ..IndexConfig::default()
    }
}

pub fn dispatcher(client: Arc<dyn IndexClient>, policy: CreatePolicy) -> Dispatcher {
    let projector = Projector::new(client, &index_config(policy));
    Dispatcher::new(TopicsConfig::default(), projector)
}

/// Ids of the entries of a parent's list field, in order.
pub fn entry_ids(list: &Value) -> Vec<String> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
