// normalizer.rs: split a record into kept fields and the undefined bucket
use serde_json::{Map, Value};

use crate::config::NormalizerConfig;
use crate::emptiness::{is_empty, prune_nested};
use crate::keys::sanitize_key;

/// One parsed log event.
pub type Record = Map<String, Value>;

/// Signals returned to the caller; the record itself is rewritten in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalized {
    /// Any key renamed, field dropped, nested leaf pruned, or field moved.
    pub changed: bool,
    /// A non-empty bucket sits under `undefined_name` after the pass.
    pub had_undefined: bool,
    /// Top-level field count of that bucket (1 for a bucket already string-encoded).
    pub undefined_fields: usize,
}

/// Normalize `record` in place.
///
/// Per top-level key: sanitize the name, prune empty nested leaves, then
/// classify. Keep-set fields stay at top level whatever their value; empty
/// fields not in the keep-empty set are dropped; everything else moves into
/// the bucket when `use_undefined` is on, or stays put when it is off.
///
/// Keep and keep-empty lookups use the original key spelling. Sanitized
/// keys that collide resolve last-write-wins in map order.
///
/// A value already stored under `undefined_name` is the bucket of an earlier
/// pass. Its fields get the same sanitize, prune and drop rules as bucketed
/// fields, so a bucket this function produced comes back unchanged.
pub fn normalize(record: &mut Record, cfg: &NormalizerConfig) -> Normalized {
    let mut changed = false;
    let mut bucket = Record::new();
    let mut previous: Option<Value> = None;

    for (orig, mut value) in std::mem::take(record) {
        if cfg.use_undefined && orig == cfg.undefined_name {
            previous = Some(value);
            continue;
        }

        let key = sanitize_key(&orig, cfg.dot_replace()).into_owned();
        changed |= key != orig;
        changed |= prune_nested(&mut value, cfg.nested_replacement());

        if cfg.keep_fields.contains(&orig) {
            record.insert(key, value);
        } else if is_empty(&value) && !cfg.keep_empty_fields.contains(&orig) {
            changed = true;
        } else if cfg.use_undefined {
            changed = true;
            bucket.insert(key, value);
        } else {
            record.insert(key, value);
        }
    }

    if let Some(prev) = previous.and_then(|prev| carry_bucket(prev, cfg, &mut changed)) {
        if bucket.is_empty() {
            record.insert(cfg.undefined_name.clone(), prev);
        } else {
            match prev {
                Value::Object(mut merged) => {
                    merged.append(&mut bucket);
                    bucket = merged;
                }
                other => {
                    bucket.insert(cfg.undefined_name.clone(), other);
                }
            }
        }
    }
    if !bucket.is_empty() {
        record.insert(cfg.undefined_name.clone(), Value::Object(bucket));
    }

    let undefined_fields = if cfg.use_undefined {
        match record.get(&cfg.undefined_name) {
            Some(Value::Object(b)) => b.len(),
            Some(_) => 1,
            None => 0,
        }
    } else {
        0
    };

    Normalized {
        changed,
        had_undefined: undefined_fields > 0,
        undefined_fields,
    }
}

// Re-check the fields of a bucket found in the input. `None` when nothing
// survives.
fn carry_bucket(prev: Value, cfg: &NormalizerConfig, changed: &mut bool) -> Option<Value> {
    let fields = match prev {
        Value::Object(fields) => fields,
        other if is_empty(&other) => {
            *changed = true;
            return None;
        }
        other => return Some(other),
    };

    let mut carried = Record::new();
    for (orig, mut value) in fields {
        let key = sanitize_key(&orig, cfg.dot_replace()).into_owned();
        *changed |= key != orig;
        *changed |= prune_nested(&mut value, cfg.nested_replacement());
        if is_empty(&value) && !cfg.keep_empty_fields.contains(&orig) {
            *changed = true;
        } else {
            carried.insert(key, value);
        }
    }
    if carried.is_empty() {
        *changed = true;
        return None;
    }
    Some(Value::Object(carried))
}

#[cfg(test)]
mod tests {
    use super::{normalize, Normalized, Record};
    use crate::config::{NormalizerConfig, RawConfig};
    use crate::emptiness::is_empty;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            other => panic!("not an object: {other}"),
        }
    }

    fn bucketing(keep: &str) -> NormalizerConfig {
        RawConfig {
            use_undefined: true,
            default_keep_fields: keep.to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config")
    }

    #[test]
    fn test_scenario_bucket_and_drop() {
        let cfg = bucketing("@timestamp");
        let mut rec = record(json!({
            "@timestamp": "T", "a": "x", "empty1": "", "u1": "v", "u2": {"sub": ""}
        }));
        let out = normalize(&mut rec, &cfg);
        assert_eq!(
            Value::Object(rec),
            json!({"@timestamp": "T", "undefined": {"a": "x", "u1": "v"}})
        );
        assert_eq!(
            out,
            Normalized { changed: true, had_undefined: true, undefined_fields: 2 }
        );
    }

    #[test]
    fn test_keep_and_keep_empty_lists() {
        let cfg = RawConfig {
            use_undefined: true,
            merge_json_log: true,
            default_keep_fields: "method,statusCode,type,@timestamp,req,res".to_string(),
            extra_keep_fields: "undefined4,undefined5,empty1,undefined3".to_string(),
            keep_empty_fields: "undefined4,undefined5,empty1,undefined3".to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config");
        let mut rec = record(json!({
            "@timestamp": "2019-07-17T21:26:45.913217+00:00",
            "undefined1": "undefined1", "undefined11": 1111, "undefined12": true, "empty1": "",
            "undefined2": {"undefined2": "undefined2", "": "", "undefined22": 2222, "undefined23": false},
            "undefined3": {"emptyvalue": ""}, "undefined4": {}, "undefined5": "undefined5",
            "undefined.6": "undefined6"
        }));
        let out = normalize(&mut rec, &cfg);
        assert_eq!(
            Value::Object(rec),
            json!({
                "@timestamp": "2019-07-17T21:26:45.913217+00:00",
                "empty1": "",
                "undefined3": {},
                "undefined4": {},
                "undefined5": "undefined5",
                "undefined": {
                    "undefined1": "undefined1",
                    "undefined11": 1111,
                    "undefined12": true,
                    "undefined2": {"undefined2": "undefined2", "undefined22": 2222, "undefined23": false},
                    "undefined.6": "undefined6"
                }
            })
        );
        assert_eq!(out.undefined_fields, 5);
    }

    #[test]
    fn test_keep_empty_only_shields_top_level() {
        let cfg = RawConfig {
            use_undefined: true,
            keep_empty_fields: "message,inner".to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config");
        let mut rec = record(json!({"message": "", "ctx": {"inner": "", "x": 1}, "gone": ""}));
        normalize(&mut rec, &cfg);
        assert_eq!(
            Value::Object(rec),
            json!({"undefined": {"message": "", "ctx": {"x": 1}}})
        );
    }

    #[test]
    fn test_bucketing_disabled_leaves_fields_in_place() {
        let cfg = RawConfig {
            default_keep_fields: "@timestamp".to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config");
        let mut rec = record(json!({"@timestamp": "T", "a": "x", "b": {"c": ""}, "n": null}));
        let out = normalize(&mut rec, &cfg);
        assert_eq!(Value::Object(rec), json!({"@timestamp": "T", "a": "x", "n": null}));
        assert_eq!(
            out,
            Normalized { changed: true, had_undefined: false, undefined_fields: 0 }
        );

        // Nothing to do
        let mut rec = record(json!({"a": "x", "b": [1, 2]}));
        assert_eq!(normalize(&mut rec, &cfg), Normalized::default());
    }

    #[test]
    fn test_kept_fields_survive_emptiness() {
        let cfg = bucketing("message,ctx");
        let mut rec = record(json!({"message": "", "ctx": {"a": ""}}));
        let out = normalize(&mut rec, &cfg);
        assert_eq!(Value::Object(rec), json!({"message": "", "ctx": {}}));
        assert!(out.changed);
        assert!(!out.had_undefined);
    }

    #[test]
    fn test_dot_sanitization() {
        let cfg = RawConfig {
            use_undefined: true,
            default_keep_fields: "kubernetes.host".to_string(),
            undefined_dot_replace_char: "_".to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config");
        let mut rec = record(json!({"kubernetes.host": "n1", "a.b": {"c.d": 1}}));
        normalize(&mut rec, &cfg);
        // Keep matched on the original spelling; nested keys untouched without merge
        assert_eq!(
            Value::Object(rec),
            json!({"kubernetes_host": "n1", "undefined": {"a_b": {"c.d": 1}}})
        );

        let merged = NormalizerConfig { merge_json_log: true, ..cfg.clone() };
        let mut rec = record(json!({"a.b": {"c.d": 1}}));
        normalize(&mut rec, &merged);
        assert_eq!(Value::Object(rec), json!({"undefined": {"a_b": {"c_d": 1}}}));

        let disabled = NormalizerConfig { dot_replace: None, ..merged };
        let mut rec = record(json!({"a.b": {"c.d": 1}}));
        normalize(&mut rec, &disabled);
        assert_eq!(Value::Object(rec), json!({"undefined": {"a.b": {"c.d": 1}}}));
    }

    #[test]
    fn test_sanitized_collision_last_write_wins() {
        let cfg = RawConfig {
            undefined_dot_replace_char: "_".to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config");
        // "a.b" sorts before "a_b", so the latter is written last.
        let mut rec = record(json!({"a.b": "dotted", "a_b": "plain"}));
        normalize(&mut rec, &cfg);
        assert_eq!(Value::Object(rec), json!({"a_b": "plain"}));
    }

    #[test]
    fn test_second_pass_is_noop() {
        let cfg = RawConfig {
            use_undefined: true,
            merge_json_log: true,
            default_keep_fields: "@timestamp".to_string(),
            keep_empty_fields: "message".to_string(),
            undefined_dot_replace_char: "_".to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config");
        let mut rec = record(json!({
            "@timestamp": "T", "message": "", "a.b": {"c": "", "d.e": 1}, "x": ""
        }));
        assert!(normalize(&mut rec, &cfg).changed);
        let first = rec.clone();
        let again = normalize(&mut rec, &cfg);
        assert!(!again.changed);
        assert!(again.had_undefined);
        assert_eq!(rec, first);

        // Buckets holding nothing but keep-empty values
        for input in [json!({"message": ""}), json!({"message": {"a": ""}})] {
            let mut rec = record(input);
            normalize(&mut rec, &cfg);
            let first = rec.clone();
            assert!(matches!(first.get("undefined"), Some(Value::Object(b)) if b.len() == 1));
            let again = normalize(&mut rec, &cfg);
            assert_eq!(
                again,
                Normalized { changed: false, had_undefined: true, undefined_fields: 1 }
            );
            assert_eq!(rec, first);
        }
    }

    #[test]
    fn test_input_bucket_is_pruned_and_sanitized() {
        let cfg = RawConfig {
            use_undefined: true,
            merge_json_log: true,
            undefined_dot_replace_char: "_".to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config");
        let mut rec = record(json!({
            "undefined": {"a": "", "b.c": {"d": ""}, "e": 1, "f.g": {"h.i": 2, "j": ""}},
            "f": ""
        }));
        let out = normalize(&mut rec, &cfg);
        assert_eq!(
            Value::Object(rec),
            json!({"undefined": {"e": 1, "f_g": {"h_i": 2}}})
        );
        assert_eq!(
            out,
            Normalized { changed: true, had_undefined: true, undefined_fields: 2 }
        );

        // Every field empty: the bucket goes too
        let mut rec = record(json!({"undefined": {"a": "", "b": {"c": ""}}}));
        let out = normalize(&mut rec, &cfg);
        assert!(rec.is_empty());
        assert!(out.changed && !out.had_undefined);
    }

    #[test]
    fn test_literal_sanitized_spelling_is_kept() {
        let cfg = RawConfig {
            use_undefined: true,
            default_keep_fields: "kubernetes.host".to_string(),
            undefined_dot_replace_char: "_".to_string(),
            ..RawConfig::default()
        }
        .resolve()
        .expect("config");
        // Indistinguishable from the output of an earlier pass
        let mut rec = record(json!({"kubernetes_host": "n1", "other_host": "n2"}));
        normalize(&mut rec, &cfg);
        assert_eq!(
            Value::Object(rec),
            json!({"kubernetes_host": "n1", "undefined": {"other_host": "n2"}})
        );
    }

    #[test]
    fn test_existing_bucket_absorbs_new_fields() {
        let cfg = bucketing("");
        let mut rec = record(json!({"undefined": {"old": 1, "dup": "old"}, "dup": "new", "z": 2}));
        let out = normalize(&mut rec, &cfg);
        assert_eq!(
            Value::Object(rec),
            json!({"undefined": {"old": 1, "dup": "new", "z": 2}})
        );
        assert_eq!(out.undefined_fields, 3);

        // A bucket string-encoded by an earlier pass is nested, not lost
        let mut rec = record(json!({"undefined": "{\"old\":1}", "z": 2}));
        normalize(&mut rec, &cfg);
        assert_eq!(
            Value::Object(rec),
            json!({"undefined": {"undefined": "{\"old\":1}", "z": 2}})
        );

        // Encoded bucket alone is carried through
        let mut rec = record(json!({"undefined": "{\"old\":1}"}));
        let out = normalize(&mut rec, &cfg);
        assert!(!out.changed);
        assert_eq!(out.undefined_fields, 1);

        let mut rec = record(json!({"undefined": {}}));
        let out = normalize(&mut rec, &cfg);
        assert!(out.changed && !out.had_undefined);
        assert!(rec.is_empty());
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(json!("")),
            "[a-z]{1,4}".prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop::collection::btree_map("[a-c.]{0,3}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect()))
        })
    }

    fn input_record() -> impl Strategy<Value = Record> {
        prop::collection::btree_map("[a-e]{1,2}(\\.[a-e])?", value(), 0..8)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(mut rec in input_record(), merge in any::<bool>(), bucket in any::<bool>()) {
            let cfg = RawConfig {
                use_undefined: bucket,
                merge_json_log: merge,
                default_keep_fields: "a,b.c".to_string(),
                keep_empty_fields: "d".to_string(),
                undefined_dot_replace_char: "_".to_string(),
                ..RawConfig::default()
            }
            .resolve()
            .expect("config");
            normalize(&mut rec, &cfg);
            let first = rec.clone();
            prop_assert!(!normalize(&mut rec, &cfg).changed);
            prop_assert_eq!(rec, first);
        }

        #[test]
        fn prop_every_field_lands_once(rec in input_record()) {
            let cfg = RawConfig {
                use_undefined: true,
                default_keep_fields: "a,b".to_string(),
                keep_empty_fields: "c".to_string(),
                ..RawConfig::default()
            }
            .resolve()
            .expect("config");
            let mut out = rec.clone();
            normalize(&mut out, &cfg);
            let bucket = match out.get("undefined") {
                Some(Value::Object(b)) => b.clone(),
                _ => Record::new(),
            };
            for (key, value) in &rec {
                let kept = out.contains_key(key);
                let bucketed = bucket.contains_key(key);
                prop_assert!(!(kept && bucketed), "{} in two places", key);
                if cfg.keep_fields.contains(key) {
                    prop_assert!(kept);
                } else if !kept && !bucketed {
                    prop_assert!(is_empty(value) && !cfg.keep_empty_fields.contains(key));
                }
            }
        }
    }
}
