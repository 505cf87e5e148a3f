// capper.rs: bound the undefined bucket's shape by string-encoding it
use crate::config::NormalizerConfig;
use crate::error::{Error, Result};
use crate::normalizer::Record;

/// What to store under `undefined_name`.
#[derive(Debug, Clone, PartialEq)]
pub enum Capped {
    /// Compact JSON text of the bucket. Key order is not part of the contract.
    Encoded(String),
    Nested(Record),
}

/// True when a bucket of `n` top-level fields must be collapsed to a string.
///
/// The cap counts fields, not bytes.
pub fn exceeds_cap(n: usize, cfg: &NormalizerConfig) -> bool {
    cfg.undefined_to_string || cfg.max_num_fields.map_or(false, |max| n > max)
}

pub fn cap(bucket: Record, cfg: &NormalizerConfig) -> Result<Capped> {
    if !cfg.use_undefined || bucket.is_empty() {
        return Ok(Capped::Nested(bucket));
    }
    if exceeds_cap(bucket.len(), cfg) {
        let encoded = serde_json::to_string(&bucket).map_err(Error::Encode)?;
        return Ok(Capped::Encoded(encoded));
    }
    Ok(Capped::Nested(bucket))
}
