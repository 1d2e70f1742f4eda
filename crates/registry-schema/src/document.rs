//! Accessors over parsed registry package-metadata documents.
//!
//! Documents are handled as `serde_json::Value` maps rather than typed
//! structs so that every per-version field the registry serves (dist URLs,
//! dependency declarations, engines, anything added later) survives a
//! rewrite untouched.

use serde_json::{Map, Value};

/// Keys of the `time` map that describe the package itself, not a version.
/// Registries have shipped both `created` and `changed` alongside `modified`.
pub const RESERVED_TIME_KEYS: [&str; 3] = ["modified", "created", "changed"];

/// Whether a `time` map key is registry metadata rather than a published
/// version. Any key that does not parse as a semver version is treated as
/// reserved, so unknown registry-internal keys are never deleted.
pub fn is_reserved_time_key(key: &str) -> bool {
    RESERVED_TIME_KEYS.contains(&key) || semver::Version::parse(key).is_err()
}

/// The package name, when present.
pub fn package_name(doc: &Value) -> Option<&str> {
    doc.get("name").and_then(Value::as_str)
}

/// The `time` map, when present.
pub fn time_map(doc: &Value) -> Option<&Map<String, Value>> {
    doc.get("time").and_then(Value::as_object)
}

/// The `versions` map, when present.
pub fn versions_map(doc: &Value) -> Option<&Map<String, Value>> {
    doc.get("versions").and_then(Value::as_object)
}

/// The version the `latest` dist-tag points at, when present.
pub fn latest_tag(doc: &Value) -> Option<&str> {
    doc.get("dist-tags")
        .and_then(Value::as_object)
        .and_then(|tags| tags.get("latest"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved_time_key("modified"));
        assert!(is_reserved_time_key("created"));
        assert!(is_reserved_time_key("changed"));
        // Registry-internal keys that are not semver are reserved too.
        assert!(is_reserved_time_key("ts"));
        assert!(is_reserved_time_key("unpublished"));
        assert!(!is_reserved_time_key("1.0.0"));
        assert!(!is_reserved_time_key("2.0.0-beta.1"));
    }

    #[test]
    fn test_accessors() {
        let doc = json!({
            "name": "left-pad",
            "versions": {"1.0.0": {}},
            "time": {"modified": "2020-01-01T00:00:00Z", "1.0.0": "2020-01-01T00:00:00Z"},
            "dist-tags": {"latest": "1.0.0"},
        });
        assert_eq!(package_name(&doc), Some("left-pad"));
        assert_eq!(latest_tag(&doc), Some("1.0.0"));
        assert_eq!(time_map(&doc).unwrap().len(), 2);
        assert_eq!(versions_map(&doc).unwrap().len(), 1);
    }
}
