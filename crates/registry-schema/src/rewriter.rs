//! Time-bounded rewriting of registry metadata documents.

use npm_bisect_common::Timestamp;
use serde_json::Value;

use crate::document::is_reserved_time_key;

/// Hide every publication strictly newer than `cutoff` from a parsed
/// registry document, editing it in place.
///
/// Removes newer versions from both the `time` and `versions` maps and
/// repoints `dist-tags.latest` at the newest preserved version when the old
/// `latest` was removed. Returns whether the document changed. Documents
/// without a `time` or `versions` map are left alone; malformed time values
/// are treated as not newer than the cutoff, so a parse failure can never
/// cause a deletion.
pub fn rewrite_document(doc: &mut Value, cutoff: Timestamp) -> bool {
    let Some(obj) = doc.as_object_mut() else {
        return false;
    };

    let mut deleted: Vec<String> = Vec::new();
    let mut newest_kept: Option<(String, Timestamp)> = None;
    {
        let Some(time) = obj.get("time").and_then(Value::as_object) else {
            return false;
        };
        if !obj.get("versions").is_some_and(Value::is_object) {
            return false;
        }

        for (key, value) in time {
            if is_reserved_time_key(key) {
                continue;
            }
            let Some(published) = value.as_str().and_then(|s| Timestamp::parse(s).ok()) else {
                continue;
            };
            if published > cutoff {
                deleted.push(key.clone());
            } else {
                let newer = match &newest_kept {
                    None => true,
                    Some((best_version, best_time)) => {
                        published > *best_time
                            || (published == *best_time && key.as_str() > best_version.as_str())
                    }
                };
                if newer {
                    newest_kept = Some((key.clone(), published));
                }
            }
        }
    }

    if deleted.is_empty() {
        return false;
    }

    if let Some(time) = obj.get_mut("time").and_then(Value::as_object_mut) {
        for key in &deleted {
            time.remove(key);
        }
    }
    if let Some(versions) = obj.get_mut("versions").and_then(Value::as_object_mut) {
        for key in &deleted {
            versions.remove(key);
        }
    }
    if let Some(tags) = obj.get_mut("dist-tags").and_then(Value::as_object_mut) {
        let latest_deleted = tags
            .get("latest")
            .and_then(Value::as_str)
            .is_some_and(|latest| deleted.iter().any(|d| d.as_str() == latest));
        if latest_deleted {
            match &newest_kept {
                Some((version, _)) => {
                    tags.insert("latest".to_string(), Value::String(version.clone()));
                }
                // Nothing survived the cutoff. Leaving `latest` absent makes
                // the resolver fail with its standard "no matching version"
                // error, which is the signal we want.
                None => {
                    tags.remove("latest");
                }
            }
        }
    }

    true
}
