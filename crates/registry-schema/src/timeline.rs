//! Publication timeline events observed while a probe runs.

use std::collections::HashSet;

use npm_bisect_common::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{is_reserved_time_key, package_name, time_map};

/// One (package, version, publish-time) observation.
///
/// The wire names match the timeline fragment files the proxy writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(rename = "packageName")]
    pub package_name: String,
    pub version: String,
    pub time: Timestamp,
}

impl std::fmt::Display for TimelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.package_name, self.version)
    }
}

/// Extract every publication event from a parsed metadata document.
///
/// Reserved and unparseable `time` entries are skipped; a document without a
/// name or a `time` map yields nothing.
pub fn collect_events(doc: &Value) -> Vec<TimelineEvent> {
    let Some(name) = package_name(doc) else {
        return Vec::new();
    };
    let Some(time) = time_map(doc) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for (version, value) in time {
        if is_reserved_time_key(version) {
            continue;
        }
        let Some(published) = value.as_str().and_then(|s| Timestamp::parse(s).ok()) else {
            continue;
        };
        events.push(TimelineEvent {
            package_name: name.to_string(),
            version: version.clone(),
            time: published,
        });
    }
    events
}

/// Sort events by publish time ascending and drop duplicate
/// (package, version) pairs, keeping the earliest observation.
pub fn merge_timeline(mut events: Vec<TimelineEvent>) -> Vec<TimelineEvent> {
    events.sort_by(|a, b| {
        a.time
            .cmp(&b.time)
            .then_with(|| a.package_name.cmp(&b.package_name))
            .then_with(|| a.version.cmp(&b.version))
    });

    let mut seen: HashSet<(String, String)> = HashSet::new();
    events.retain(|e| seen.insert((e.package_name.clone(), e.version.clone())));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_skips_reserved_and_malformed() {
        let doc = json!({
            "name": "left-pad",
            "time": {
                "created": "2020-01-01T00:00:00Z",
                "modified": "2020-02-01T00:00:00Z",
                "1.0.0": "2020-01-01T00:00:00Z",
                "1.1.0": "not a date",
                "2.0.0": "2020-02-01T00:00:00Z",
            },
        });
        let mut events = collect_events(&doc);
        events.sort_by(|a, b| a.version.cmp(&b.version));
        let versions: Vec<&str> = events.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0.0", "2.0.0"]);
        assert!(events.iter().all(|e| e.package_name == "left-pad"));
    }

    #[test]
    fn test_collect_without_name_or_time() {
        assert!(collect_events(&json!({"time": {"1.0.0": "2020-01-01T00:00:00Z"}})).is_empty());
        assert!(collect_events(&json!({"name": "x"})).is_empty());
    }

    #[test]
    fn test_merge_sorts_and_dedupes() {
        let event = |name: &str, version: &str, time: &str| TimelineEvent {
            package_name: name.to_string(),
            version: version.to_string(),
            time: Timestamp::parse(time).unwrap(),
        };
        let merged = merge_timeline(vec![
            event("b", "2.0.0", "2020-03-01"),
            event("a", "1.0.0", "2020-01-01"),
            event("a", "1.0.0", "2020-01-01"),
            event("a", "1.1.0", "2020-02-01"),
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].to_string(), "a@1.0.0");
        assert_eq!(merged[1].to_string(), "a@1.1.0");
        assert_eq!(merged[2].to_string(), "b@2.0.0");
    }

    #[test]
    fn test_wire_format_round_trip() {
        let raw = r#"[{"packageName":"a","version":"1.0.1","time":"2020-01-02T00:00:00.000Z"}]"#;
        let events: Vec<TimelineEvent> = serde_json::from_str(raw).unwrap();
        assert_eq!(events[0].package_name, "a");
        assert_eq!(events[0].time, Timestamp::parse("2020-01-02").unwrap());

        let serialized = serde_json::to_string(&events).unwrap();
        assert!(serialized.contains("\"packageName\":\"a\""));
        let reparsed: Vec<TimelineEvent> = serde_json::from_str(&serialized).unwrap();
        assert_eq!(reparsed, events);
    }
}
