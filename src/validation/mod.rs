//! Structural validation for inbound change events.
//!
//! Runs before any index mutation. The payload schema is open: only
//! `resource` and `id` are checked, every other field passes through.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::event::{Event, ResourceKind, ID_FIELD, RESOURCE_FIELD};

/// Error constants for validation failures.
pub mod errmsg {
    pub const NOT_AN_OBJECT: &str = "must be an object";
    pub const REQUIRED: &str = "is required";
    pub const NOT_A_STRING: &str = "must be a string";
    pub const EMPTY: &str = "must not be empty";
    pub const INVALID_DATE: &str = "must be a valid date";
}

/// Paths reported in [`ValidationError::path`].
pub mod path {
    pub const ROOT: &str = "$";
    pub const TOPIC: &str = "topic";
    pub const ORIGINATOR: &str = "originator";
    pub const TIMESTAMP: &str = "timestamp";
    pub const MIME_TYPE: &str = "mime-type";
    pub const PAYLOAD: &str = "payload";
    pub const PAYLOAD_RESOURCE: &str = "payload.resource";
    pub const PAYLOAD_ID: &str = "payload.id";
}

/// A violation of the event schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid event: '{path}' {reason}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

/// Validate a decoded message and lift it into an [`Event`].
pub fn validate(message: &Value) -> Result<Event> {
    let envelope = message
        .as_object()
        .ok_or_else(|| ValidationError::new(path::ROOT, errmsg::NOT_AN_OBJECT))?;

    let topic = required_string(envelope, "topic", path::TOPIC, false)?;
    let originator = required_string(envelope, "originator", path::ORIGINATOR, false)?;

    let timestamp = match envelope.get("timestamp") {
        None | Some(Value::Null) => {
            return Err(ValidationError::new(path::TIMESTAMP, errmsg::REQUIRED))
        }
        Some(raw) => parse_timestamp(raw)
            .ok_or_else(|| ValidationError::new(path::TIMESTAMP, errmsg::INVALID_DATE))?,
    };

    let mime_type = required_string(envelope, "mime-type", path::MIME_TYPE, true)?;

    let payload = match envelope.get("payload") {
        None | Some(Value::Null) => {
            return Err(ValidationError::new(path::PAYLOAD, errmsg::REQUIRED))
        }
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ValidationError::new(path::PAYLOAD, errmsg::NOT_AN_OBJECT)),
    };

    let tag = required_string(payload, RESOURCE_FIELD, path::PAYLOAD_RESOURCE, false)?;
    let resource = ResourceKind::from_tag(tag).ok_or_else(|| {
        ValidationError::new(path::PAYLOAD_RESOURCE, unknown_resource_reason())
    })?;

    let id = required_string(payload, ID_FIELD, path::PAYLOAD_ID, false)?;

    Ok(Event {
        topic: topic.to_string(),
        originator: originator.to_string(),
        timestamp,
        mime_type: mime_type.to_string(),
        resource,
        id: id.to_string(),
        payload: payload.clone(),
    })
}

fn unknown_resource_reason() -> String {
    let allowed: Vec<&str> = ResourceKind::tags().collect();
    format!("must be one of [{}]", allowed.join(", "))
}

fn required_string<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
    allow_empty: bool,
) -> Result<&'a str> {
    match object.get(key) {
        None | Some(Value::Null) => Err(ValidationError::new(path, errmsg::REQUIRED)),
        Some(Value::String(s)) if s.is_empty() && !allow_empty => {
            Err(ValidationError::new(path, errmsg::EMPTY))
        }
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ValidationError::new(path, errmsg::NOT_A_STRING)),
    }
}

/// Parse an event timestamp.
///
/// Accepts RFC 3339, RFC 2822, ISO-8601 date-times without offset (read as
/// UTC), plain dates, and milliseconds since the Unix epoch given either as
/// a number or a numeric string. Fractional milliseconds are truncated.
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => match n.as_i64() {
            Some(millis) => Utc.timestamp_millis_opt(millis).single(),
            None => n.as_f64().and_then(from_epoch_millis),
        },
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_millis_opt(millis.trunc() as i64).single()
}

/// Whether `s` is `[+-]digits[.digits]`.
fn is_numeric(s: &str) -> bool {
    let unsigned = s.strip_prefix(&['+', '-'][..]).unwrap_or(s);
    let (int, frac) = match unsigned.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (unsigned, None),
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    digits(int) && frac.map_or(true, digits)
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if is_numeric(s) {
        return s.parse::<f64>().ok().and_then(from_epoch_millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
