//! Property tests for the time-bounded rewriter.
//!
//! Uses proptest to verify the rewriter invariants over arbitrary generated
//! documents: no kept version is newer than the cutoff, the `versions` and
//! `time` key sets stay in lockstep, `latest` stays valid while anything is
//! preserved, rewriting is idempotent, and preservation is monotone in the
//! cutoff.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{TimeZone, Utc};
use npm_bisect_common::Timestamp;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

use crate::document::is_reserved_time_key;
use crate::rewriter::rewrite_document;

const EPOCH: i64 = 1_577_836_800; // 2020-01-01T00:00:00Z

type VersionEntries = BTreeMap<(u8, u8, u8), i64>;

fn rfc3339(offset_secs: i64) -> String {
    Utc.timestamp_opt(EPOCH + offset_secs, 0).unwrap().to_rfc3339()
}

fn cutoff_at(offset_secs: i64) -> Timestamp {
    Timestamp::parse(&rfc3339(offset_secs)).unwrap()
}

/// Build a registry document whose `versions` and `time` key sets agree and
/// whose `latest` points at the newest publication.
fn build_doc(entries: &VersionEntries) -> Value {
    let mut versions = Map::new();
    let mut time = Map::new();
    time.insert("created".to_string(), json!(rfc3339(0)));
    time.insert("modified".to_string(), json!(rfc3339(2_000_000)));

    let mut latest: Option<(String, i64)> = None;
    for ((major, minor, patch), offset) in entries {
        let version = format!("{major}.{minor}.{patch}");
        versions.insert(
            version.clone(),
            json!({"dist": {"tarball": format!("https://registry.npmjs.org/pkg/-/pkg-{version}.tgz")}}),
        );
        time.insert(version.clone(), json!(rfc3339(*offset)));
        let newer = latest
            .as_ref()
            .map_or(true, |(v, t)| offset > t || (offset == t && version.as_str() > v.as_str()));
        if newer {
            latest = Some((version, *offset));
        }
    }

    let mut doc = Map::new();
    doc.insert("name".to_string(), json!("pkg"));
    doc.insert("versions".to_string(), Value::Object(versions));
    doc.insert("time".to_string(), Value::Object(time));
    if let Some((latest, _)) = latest {
        doc.insert("dist-tags".to_string(), json!({"latest": latest}));
    }
    Value::Object(doc)
}

fn object_keys(doc: &Value, field: &str) -> BTreeSet<String> {
    doc.get(field)
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

fn non_reserved_time_keys(doc: &Value) -> BTreeSet<String> {
    object_keys(doc, "time")
        .into_iter()
        .filter(|k| !is_reserved_time_key(k))
        .collect()
}

fn entries_strategy() -> impl Strategy<Value = VersionEntries> {
    proptest::collection::btree_map((0u8..3, 0u8..4, 0u8..4), 0i64..1_000_000, 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn prop_kept_versions_at_or_before_cutoff(
        entries in entries_strategy(),
        cut in 0i64..1_000_000,
    ) {
        let mut doc = build_doc(&entries);
        let cutoff = cutoff_at(cut);
        rewrite_document(&mut doc, cutoff);

        let time = doc["time"].as_object().unwrap();
        for key in non_reserved_time_keys(&doc) {
            let published = Timestamp::parse(time[&key].as_str().unwrap()).unwrap();
            prop_assert!(published <= cutoff);
        }
    }

    #[test]
    fn prop_version_and_time_keys_stay_in_lockstep(
        entries in entries_strategy(),
        cut in 0i64..1_000_000,
    ) {
        let mut doc = build_doc(&entries);
        prop_assert_eq!(object_keys(&doc, "versions"), non_reserved_time_keys(&doc));
        rewrite_document(&mut doc, cutoff_at(cut));
        prop_assert_eq!(object_keys(&doc, "versions"), non_reserved_time_keys(&doc));
    }

    #[test]
    fn prop_latest_valid_while_anything_preserved(
        entries in entries_strategy(),
        cut in 0i64..1_000_000,
    ) {
        let mut doc = build_doc(&entries);
        rewrite_document(&mut doc, cutoff_at(cut));

        let versions = object_keys(&doc, "versions");
        if !versions.is_empty() {
            let latest = doc["dist-tags"]["latest"].as_str().unwrap().to_string();
            prop_assert!(versions.contains(&latest));
        }
    }

    #[test]
    fn prop_rewrite_is_idempotent(
        entries in entries_strategy(),
        cut in 0i64..1_000_000,
    ) {
        let mut doc = build_doc(&entries);
        let cutoff = cutoff_at(cut);
        rewrite_document(&mut doc, cutoff);

        let first_pass = doc.clone();
        let changed_again = rewrite_document(&mut doc, cutoff);
        prop_assert!(!changed_again);
        prop_assert_eq!(doc, first_pass);
    }

    #[test]
    fn prop_preservation_is_monotone_in_cutoff(
        entries in entries_strategy(),
        cut_a in 0i64..1_000_000,
        cut_b in 0i64..1_000_000,
    ) {
        let (early, late) = (cut_a.min(cut_b), cut_a.max(cut_b));

        let mut doc_early = build_doc(&entries);
        rewrite_document(&mut doc_early, cutoff_at(early));
        let mut doc_late = build_doc(&entries);
        rewrite_document(&mut doc_late, cutoff_at(late));

        let kept_early = object_keys(&doc_early, "versions");
        let kept_late = object_keys(&doc_late, "versions");
        prop_assert!(kept_early.is_subset(&kept_late));
    }
}
