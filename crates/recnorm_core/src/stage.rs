// stage.rs: per-record pipeline step (normalize, then cap the bucket)
use serde_json::Value;

use crate::capper::{cap, Capped};
use crate::config::NormalizerConfig;
use crate::error::{Error, Result};
use crate::normalizer::{normalize, Record};

/// Signals for the host's diagnostics; bucket contents stay private.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub changed: bool,
    pub had_undefined: bool,
    pub undefined_fields: usize,
    /// The bucket was replaced by its string encoding on this pass.
    pub encoded: bool,
}

/// Run one record through the normalizer and the field cap.
pub fn process(record: &mut Record, cfg: &NormalizerConfig) -> Result<Outcome> {
    let norm = normalize(record, cfg);
    let mut outcome = Outcome {
        changed: norm.changed,
        had_undefined: norm.had_undefined,
        undefined_fields: norm.undefined_fields,
        encoded: false,
    };

    if norm.had_undefined {
        // An already-encoded bucket goes back untouched.
        let stored = match record.remove(&cfg.undefined_name) {
            Some(Value::Object(bucket)) => match cap(bucket, cfg)? {
                Capped::Encoded(s) => {
                    outcome.encoded = true;
                    outcome.changed = true;
                    Some(Value::String(s))
                }
                Capped::Nested(b) => Some(Value::Object(b)),
            },
            other => other,
        };
        if let Some(value) = stored {
            record.insert(cfg.undefined_name.clone(), value);
        }
    }

    tracing::debug!(
        changed = outcome.changed,
        had_undefined = outcome.had_undefined,
        undefined_fields = outcome.undefined_fields,
        encoded = outcome.encoded,
        "record normalized"
    );
    Ok(outcome)
}

/// Same as [`process`] for a record still in JSON text form.
pub fn process_json(line: &str, cfg: &NormalizerConfig) -> Result<(String, Outcome)> {
    let mut record = match serde_json::from_str::<Value>(line).map_err(Error::RecordParse)? {
        Value::Object(map) => map,
        _ => return Err(Error::NotAnObject),
    };
    let outcome = process(&mut record, cfg)?;
    let out = serde_json::to_string(&record).map_err(Error::Encode)?;
    Ok((out, outcome))
}
