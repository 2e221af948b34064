//! Push notification preference model and suppression rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Singleton key->bool preference map, cached in the agent's durable store
/// and overwritten wholesale whenever the foreground pushes an update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushPreferenceSnapshot {
    pub flags: BTreeMap<String, bool>,
}

impl PushPreferenceSnapshot {
    pub fn set(mut self, key: impl Into<String>, enabled: bool) -> Self {
        self.flags.insert(key.into(), enabled);
        self
    }
}

/// Normalized push payload delivered to pages and, optionally, surfaced as a
/// system notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub event_type: String,
    pub level: String,
    pub route: Option<String>,
}

impl PushPayload {
    /// Normalize a loose JSON push message, tolerating missing fields.
    pub fn normalize(raw: &serde_json::Value) -> Self {
        let text = |key: &str, default: &str| {
            raw.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            title: text("title", "FieldOps"),
            body: text("body", ""),
            event_type: text("eventType", "generic"),
            level: text("level", "info"),
            route: raw
                .get("route")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

/// Decide whether a system notification may be shown for this payload.
///
/// Two keys are derived from the payload; an explicit `false` on either one
/// suppresses. A missing snapshot or missing key allows by default.
pub fn should_display(snapshot: Option<&PushPreferenceSnapshot>, payload: &PushPayload) -> bool {
    let Some(snapshot) = snapshot else {
        return true;
    };
    let event_key = format!("notify_{}", payload.event_type);
    let level_key = format!("notify_level_{}", payload.level);
    for key in [event_key, level_key] {
        if snapshot.flags.get(&key) == Some(&false) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status_change_payload() -> PushPayload {
        PushPayload::normalize(&json!({
            "title": "Quote updated",
            "body": "Quote #18 moved to approved",
            "eventType": "status_change",
            "level": "info",
            "route": "/quotes/18"
        }))
    }

    #[test]
    fn normalize_applies_defaults_for_missing_fields() {
        let payload = PushPayload::normalize(&json!({ "body": "hi" }));
        assert_eq!(payload.title, "FieldOps");
        assert_eq!(payload.event_type, "generic");
        assert_eq!(payload.level, "info");
        assert_eq!(payload.route, None);
    }

    #[test]
    fn explicit_off_on_event_key_suppresses() {
        let snapshot = PushPreferenceSnapshot::default().set("notify_status_change", false);
        assert!(!should_display(Some(&snapshot), &status_change_payload()));
    }

    #[test]
    fn explicit_off_on_level_key_suppresses() {
        let snapshot = PushPreferenceSnapshot::default().set("notify_level_info", false);
        assert!(!should_display(Some(&snapshot), &status_change_payload()));
    }

    #[test]
    fn missing_snapshot_or_key_allows_by_default() {
        assert!(should_display(None, &status_change_payload()));

        let unrelated = PushPreferenceSnapshot::default().set("notify_new_message", false);
        assert!(should_display(Some(&unrelated), &status_change_payload()));
    }

    #[test]
    fn snapshot_round_trips_as_flat_map() {
        let snapshot = PushPreferenceSnapshot::default()
            .set("notify_status_change", true)
            .set("notify_new_message", false);
        let encoded = serde_json::to_string(&snapshot).expect("serialize");
        assert_eq!(
            encoded,
            "{\"notify_new_message\":false,\"notify_status_change\":true}"
        );
        let decoded: PushPreferenceSnapshot =
            serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, snapshot);
    }
}
