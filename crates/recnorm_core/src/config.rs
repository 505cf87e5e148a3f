// config.rs: normalizer options, resolved once into an immutable snapshot
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::keys::{sanitize_key, split_field_list, DOT_REPLACE_DISABLED};

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_VAR: &str = "UNDEFINED_CONFIG";

/// The config document as written on disk.
///
/// Accepts the camelCase option names plus the snake_case and
/// `Capitalized_snake` spellings older deployments emit. Unknown keys are
/// ignored.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RawConfig {
    #[serde(rename = "useUndefined", alias = "use_undefined", alias = "Use_undefined")]
    pub use_undefined: bool,
    #[serde(rename = "mergeJSONLog", alias = "merge_json_log", alias = "Merge_json_log")]
    pub merge_json_log: bool,
    #[serde(
        rename = "undefinedToString",
        alias = "undefined_to_string",
        alias = "Undefined_to_string"
    )]
    pub undefined_to_string: bool,
    #[serde(
        rename = "defaultKeepFields",
        alias = "default_keep_fields",
        alias = "Default_keep_fields"
    )]
    pub default_keep_fields: String,
    #[serde(rename = "extraKeepFields", alias = "extra_keep_fields", alias = "Extra_keep_fields")]
    pub extra_keep_fields: String,
    #[serde(rename = "keepEmptyFields", alias = "keep_empty_fields", alias = "Keep_empty_fields")]
    pub keep_empty_fields: String,
    #[serde(rename = "undefinedName", alias = "undefined_name", alias = "Undefined_name")]
    pub undefined_name: String,
    #[serde(
        rename = "undefinedDotReplaceChar",
        alias = "undefined_dot_replace_char",
        alias = "Undefined_dot_replace_char"
    )]
    pub undefined_dot_replace_char: String,
    #[serde(
        rename = "undefinedMaxNumFields",
        alias = "undefined_max_num_fields",
        alias = "Undefined_max_num_fields"
    )]
    pub undefined_max_num_fields: i64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            use_undefined: false,
            merge_json_log: false,
            undefined_to_string: false,
            default_keep_fields: String::new(),
            extra_keep_fields: String::new(),
            keep_empty_fields: String::new(),
            undefined_name: "undefined".to_string(),
            undefined_dot_replace_char: DOT_REPLACE_DISABLED.to_string(),
            undefined_max_num_fields: -1,
        }
    }
}

impl RawConfig {
    /// Parse the comma lists and check the options fit together.
    pub fn resolve(self) -> Result<NormalizerConfig> {
        if self.undefined_name.is_empty() {
            return Err(Error::InvalidConfig("undefinedName must not be empty".to_string()));
        }
        let dot_replace = match self.undefined_dot_replace_char.as_str() {
            DOT_REPLACE_DISABLED => None,
            "" => {
                return Err(Error::InvalidConfig(format!(
                    "undefinedDotReplaceChar must not be empty; use {} to disable",
                    DOT_REPLACE_DISABLED
                )))
            }
            rep if rep.contains('.') => {
                return Err(Error::InvalidConfig(format!(
                    "undefinedDotReplaceChar {:?} must not contain '.'",
                    rep
                )))
            }
            rep => Some(rep.to_string()),
        };

        let mut keep_fields = split_field_list(&self.default_keep_fields);
        keep_fields.extend(split_field_list(&self.extra_keep_fields));
        let keep_fields = with_sanitized_spellings(keep_fields, dot_replace.as_deref());
        let keep_empty_fields =
            with_sanitized_spellings(split_field_list(&self.keep_empty_fields), dot_replace.as_deref());
        if self.use_undefined && keep_fields.contains(&self.undefined_name) {
            return Err(Error::InvalidConfig(format!(
                "Do not put [{}] in defaultKeepFields or extraKeepFields",
                self.undefined_name
            )));
        }

        Ok(NormalizerConfig {
            use_undefined: self.use_undefined,
            merge_json_log: self.merge_json_log,
            undefined_to_string: self.undefined_to_string,
            keep_fields,
            keep_empty_fields,
            undefined_name: self.undefined_name,
            dot_replace,
            max_num_fields: usize::try_from(self.undefined_max_num_fields).ok(),
        })
    }
}

// A dotted name is also listed under its sanitized spelling so records that
// already went through a pass still match.
fn with_sanitized_spellings(names: HashSet<String>, replacement: Option<&str>) -> HashSet<String> {
    let sanitized: Vec<String> = names
        .iter()
        .filter_map(|name| match sanitize_key(name, replacement) {
            Cow::Owned(s) => Some(s),
            Cow::Borrowed(_) => None,
        })
        .collect();
    let mut names = names;
    names.extend(sanitized);
    names
}

/// Read-only options shared by every record invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizerConfig {
    pub use_undefined: bool,
    pub merge_json_log: bool,
    pub undefined_to_string: bool,
    /// `defaultKeepFields` ∪ `extraKeepFields`, matched against the original
    /// key spelling. Dotted names are also present in sanitized form, so with
    /// `_` as the replacement a literal `kubernetes_host` in the input matches
    /// a `kubernetes.host` entry just like the output of an earlier pass does.
    pub keep_fields: HashSet<String>,
    /// Top-level fields kept even when empty; same spelling rule as `keep_fields`.
    pub keep_empty_fields: HashSet<String>,
    pub undefined_name: String,
    /// `None` when sanitization is disabled.
    pub dot_replace: Option<String>,
    /// `None` when the cap is disabled (negative in the document).
    pub max_num_fields: Option<usize>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            use_undefined: false,
            merge_json_log: false,
            undefined_to_string: false,
            keep_fields: HashSet::new(),
            keep_empty_fields: HashSet::new(),
            undefined_name: "undefined".to_string(),
            dot_replace: None,
            max_num_fields: None,
        }
    }
}

impl NormalizerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json).map_err(Error::ConfigParse)?;
        raw.resolve()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading normalizer config");
        let data = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_json(&data)?;
        tracing::debug!(
            use_undefined = cfg.use_undefined,
            keep_fields = cfg.keep_fields.len(),
            max_num_fields = ?cfg.max_num_fields,
            "normalizer config resolved"
        );
        Ok(cfg)
    }

    /// Load from the file named by [`CONFIG_PATH_VAR`].
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).map_err(|_| Error::MissingConfigPath(CONFIG_PATH_VAR))?;
        Self::from_path(path)
    }

    pub fn dot_replace(&self) -> Option<&str> {
        self.dot_replace.as_deref()
    }

    /// Replacement applied below the top level; only when embedded documents are merged.
    pub fn nested_replacement(&self) -> Option<&str> {
        if self.merge_json_log {
            self.dot_replace()
        } else {
            None
        }
    }
}
