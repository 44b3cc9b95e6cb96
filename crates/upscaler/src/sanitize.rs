//! Helpers for turning untrusted upload names into safe file names, and for
//! keeping full paths out of tracing span attributes.

use std::collections::HashSet;
use std::path::Path;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips any directory part of an uploaded name, as browsers on some
/// platforms send full client paths.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Reduces an upload name to a stem of alphanumerics, `-`, `_` and spaces.
///
/// - `../bad/name.jpg` → `name`
/// - `   ` → `image`
pub fn safe_stem(name: &str) -> String {
    let base = base_name(name);
    let stem = match base.rfind('.') {
        Some(pos) if pos > 0 => &base[..pos],
        _ => base,
    };

    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Lowercased extension of an upload name including the dot, if any.
pub fn extension(name: &str) -> Option<String> {
    let base = base_name(name);
    base.rfind('.')
        .filter(|&pos| pos > 0)
        .map(|pos| base[pos..].to_lowercase())
}

/// Returns `base` if unused, otherwise the first free `stem_N.ext` with N ≥ 2.
/// The returned name is recorded in `used`.
pub fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }

    let (stem, ext) = match base.rfind('.') {
        Some(pos) => (&base[..pos], &base[pos..]),
        None => (base, ""),
    };

    let mut counter = 2usize;
    loop {
        let candidate = format!("{}_{}{}", stem, counter, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
