// keys.rs: field-name helpers (keep-list splitting and dot sanitization)
use std::borrow::Cow;
use std::collections::HashSet;

use memchr::{memchr, memchr_iter};

/// Value of `undefinedDotReplaceChar` that turns key sanitization off.
pub const DOT_REPLACE_DISABLED: &str = "UNUSED";

/// Split a comma-separated field list into a set of names.
///
/// Entries are trimmed; empty entries are skipped, so `""`, `"a,,b"` and
/// `"a,b,"` all behave as expected.
pub fn split_field_list(list: &str) -> HashSet<String> {
    let bytes = list.as_bytes();
    let mut out = HashSet::new();
    let mut start = 0usize;
    for end in memchr_iter(b',', bytes).chain(std::iter::once(bytes.len())) {
        let name = list[start..end].trim();
        if !name.is_empty() {
            out.insert(name.to_string());
        }
        start = end + 1;
    }
    out
}

/// Replace every `.` in `key` with `replacement`.
///
/// Borrows when there is nothing to do, so the common case of a clean key
/// costs a single `memchr` scan.
pub fn sanitize_key<'a>(key: &'a str, replacement: Option<&str>) -> Cow<'a, str> {
    match replacement {
        Some(rep) if memchr(b'.', key.as_bytes()).is_some() => Cow::Owned(key.replace('.', rep)),
        _ => Cow::Borrowed(key),
    }
}

/// Owned variant of [`sanitize_key`]; the flag reports whether the key was rewritten.
pub fn sanitize_owned(key: String, replacement: Option<&str>) -> (String, bool) {
    let rewritten = match sanitize_key(&key, replacement) {
        Cow::Owned(s) => Some(s),
        Cow::Borrowed(_) => None,
    };
    match rewritten {
        Some(s) => (s, true),
        None => (key, false),
    }
}
