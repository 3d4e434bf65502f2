//! Script path resolution against the mounted storage root.

use serde::Serialize;
use thiserror::Error;

/// Mount point of the script volume.
pub const DEFAULT_SCRIPT_ROOT: &str = "/assets";

/// Size of the path buffer, terminator included.
pub const PATH_BUFFER_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    pub absolute_path: String,
    /// Pattern appended to the interpreter's `package.path`.
    pub search_path_suffix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid script name: empty")]
    EmptyName,

    #[error("invalid script name: path of {len} bytes exceeds buffer of {capacity}")]
    TooLong { len: usize, capacity: usize },

    #[error("invalid script name '{0}': traversal outside the script root")]
    Traversal(String),

    #[error("invalid script root: empty")]
    InvalidRoot,
}

/// Resolves with the default path buffer capacity.
pub fn resolve(root: &str, logical_name: &str) -> Result<ResolvedPath, ResolveError> {
    resolve_with_capacity(root, logical_name, PATH_BUFFER_CAPACITY)
}

/// Joins `root` and `logical_name`, failing closed instead of truncating.
pub fn resolve_with_capacity(
    root: &str,
    logical_name: &str,
    capacity: usize,
) -> Result<ResolvedPath, ResolveError> {
    if root.is_empty() {
        return Err(ResolveError::InvalidRoot);
    }
    if logical_name.is_empty() {
        return Err(ResolveError::EmptyName);
    }
    if logical_name.starts_with('/')
        || logical_name
            .split('/')
            .any(|seg| seg.is_empty() || seg == "..")
    {
        return Err(ResolveError::Traversal(logical_name.to_string()));
    }

    let base = trim_root(root);
    let absolute_path = format!("{}/{}", base, logical_name);
    // one byte is reserved for the terminator
    if absolute_path.len() + 1 > capacity {
        return Err(ResolveError::TooLong {
            len: absolute_path.len() + 1,
            capacity,
        });
    }

    Ok(ResolvedPath {
        absolute_path,
        search_path_suffix: format!("{}/?.lua", base),
    })
}

/// Appends `suffix` to an existing search path, never replacing it.
pub fn extend_search_path(existing: &str, suffix: &str) -> String {
    if existing.is_empty() {
        suffix.to_string()
    } else {
        format!("{};{}", existing, suffix)
    }
}

fn trim_root(root: &str) -> &str {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        // root was "/" (or a run of slashes)
        ""
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_under_assets_root() {
        let r = resolve("/assets", "fibonacci.lua").unwrap();
        assert_eq!(r.absolute_path, "/assets/fibonacci.lua");
        assert_eq!(r.search_path_suffix, "/assets/?.lua");
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = resolve("/data/scripts", "lib/util.lua");
        let b = resolve("/data/scripts", "lib/util.lua");
        assert_eq!(a, b);
    }

    #[test]
    fn trailing_separator_is_not_doubled() {
        let r = resolve("/assets/", "qr_code.lua").unwrap();
        assert_eq!(r.absolute_path, "/assets/qr_code.lua");
        assert_eq!(r.search_path_suffix, "/assets/?.lua");

        let r = resolve("/", "boot.lua").unwrap();
        assert_eq!(r.absolute_path, "/boot.lua");
    }

    #[test]
    fn rejects_empty_and_traversal_names() {
        assert_eq!(resolve("/assets", ""), Err(ResolveError::EmptyName));
        assert!(matches!(resolve("/assets", "../etc/passwd"), Err(ResolveError::Traversal(_))));
        assert!(matches!(resolve("/assets", "a/../../b.lua"), Err(ResolveError::Traversal(_))));
        assert!(matches!(resolve("/assets", "/abs.lua"), Err(ResolveError::Traversal(_))));
        assert!(matches!(resolve("/assets", "a//b.lua"), Err(ResolveError::Traversal(_))));
        assert_eq!(resolve("", "x.lua"), Err(ResolveError::InvalidRoot));
    }

    #[test]
    fn fails_closed_at_buffer_capacity() {
        // "/assets/" is 8 bytes; 119 more plus the terminator fills 128 exactly
        let fits = format!("{}.lua", "a".repeat(115));
        assert!(resolve("/assets", &fits).is_ok());

        let overflow = format!("{}.lua", "a".repeat(116));
        assert_eq!(
            resolve("/assets", &overflow),
            Err(ResolveError::TooLong { len: 129, capacity: 128 })
        );
    }

    #[test]
    fn search_path_is_appended() {
        assert_eq!(extend_search_path("./?.lua", "/assets/?.lua"), "./?.lua;/assets/?.lua");
        assert_eq!(extend_search_path("", "/assets/?.lua"), "/assets/?.lua");
    }
}
