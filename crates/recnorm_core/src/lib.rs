// recnorm_core: pure Rust library for log-record normalization ahead of a schema-on-write sink.
//
// Each record is split into known (kept) fields and an "undefined" bucket;
// fields carrying no information are dropped, dotted keys are sanitized, and
// an oversized bucket is collapsed into a single JSON string.
pub mod capper;
pub mod config;
pub mod emptiness;
pub mod error;
pub mod keys;
pub mod logfile;
pub mod normalizer;
pub mod stage;

pub use capper::{cap, exceeds_cap, Capped};
pub use config::{NormalizerConfig, RawConfig, CONFIG_PATH_VAR};
pub use emptiness::{is_empty, prune_nested};
pub use error::{Error, Result};
pub use keys::{sanitize_key, split_field_list, DOT_REPLACE_DISABLED};
pub use logfile::{open_log_file, LOGGING_FILE_VAR};
pub use normalizer::{normalize, Normalized, Record};
pub use stage::{process, process_json, Outcome};
