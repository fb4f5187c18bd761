//! Challenge-id compatibility shim for submission payloads.
//!
//! Older producers send the challenge reference as `challenge_id`; newer ones
//! may send both the legacy id and the derived canonical id (`v5ChallengeId`).
//! The index only ever stores `challengeId` (canonical) and, when it differs
//! from what the producer sent, `legacyChallengeId`.

use serde_json::{Map, Value};

pub const CHALLENGE_ID: &str = "challengeId";
pub const LEGACY_CHALLENGE_ID: &str = "legacyChallengeId";
pub const SNAKE_CASE_CHALLENGE_ID: &str = "challenge_id";
pub const V5_CHALLENGE_ID: &str = "v5ChallengeId";

/// Rename legacy keys so the canonical id sits under `challengeId`.
///
/// Returns the challenge id as originally supplied, before the canonical id
/// replaced it.
fn canonicalize(payload: &mut Map<String, Value>) -> Option<Value> {
    let snake = payload.remove(SNAKE_CASE_CHALLENGE_ID);
    if !payload.contains_key(CHALLENGE_ID) {
        if let Some(value) = snake {
            payload.insert(CHALLENGE_ID.to_string(), value);
        }
    }

    let raw = payload.get(CHALLENGE_ID).filter(|v| !v.is_null()).cloned();

    match payload.remove(V5_CHALLENGE_ID) {
        Some(Value::Null) | None => {}
        Some(canonical) => {
            payload.insert(CHALLENGE_ID.to_string(), canonical);
        }
    }

    raw
}

/// Normalization applied to submission Create payloads.
pub fn normalize_for_create(payload: &mut Map<String, Value>) {
    canonicalize(payload);
}

/// Normalization applied to submission Update payloads.
///
/// Same renames as on create; in addition, when the canonical id differs
/// from the supplied one, the supplied value is kept as `legacyChallengeId`
/// unless the producer already set that field.
pub fn normalize_for_update(payload: &mut Map<String, Value>) {
    let Some(raw) = canonicalize(payload) else {
        return;
    };
    let differs = payload
        .get(CHALLENGE_ID)
        .map_or(false, |canonical| *canonical != raw);
    if differs && !payload.contains_key(LEGACY_CHALLENGE_ID) {
        payload.insert(LEGACY_CHALLENGE_ID.to_string(), raw);
    }
}
