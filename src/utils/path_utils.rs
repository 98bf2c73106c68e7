use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_EXECUTION_PREFIX, DEFAULT_STORAGE_PREFIX};

/// The two mount points under which the same shared storage is visible.
///
/// The execution host (where the dispatcher runs and touches the filesystem)
/// sees the project under `execution_prefix`; the remote job platform and the
/// database records use `storage_prefix`. Every stored path is in the storage
/// namespace and must go through [`PathNamespaces::to_execution_path`] before
/// any local filesystem access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNamespaces {
    pub execution_prefix: String,
    pub storage_prefix: String,
}

impl Default for PathNamespaces {
    fn default() -> Self {
        Self {
            execution_prefix: DEFAULT_EXECUTION_PREFIX.to_string(),
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
        }
    }
}

impl PathNamespaces {
    pub fn new(execution_prefix: impl Into<String>, storage_prefix: impl Into<String>) -> Self {
        Self {
            execution_prefix: trim_trailing_slash(execution_prefix.into()),
            storage_prefix: trim_trailing_slash(storage_prefix.into()),
        }
    }

    /// Convert an execution-host path to its shared-storage form.
    pub fn to_storage_path(&self, path: impl AsRef<Path>) -> String {
        swap_prefix(
            &path.as_ref().to_string_lossy(),
            &self.execution_prefix,
            &self.storage_prefix,
        )
    }

    /// Convert a shared-storage path to the path the execution host can open.
    pub fn to_execution_path(&self, path: &str) -> PathBuf {
        PathBuf::from(swap_prefix(path, &self.storage_prefix, &self.execution_prefix))
    }

    pub fn to_storage_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<String> {
        paths.iter().map(|p| self.to_storage_path(p)).collect()
    }

    pub fn to_execution_paths<S: AsRef<str>>(&self, paths: &[S]) -> Vec<PathBuf> {
        paths.iter().map(|p| self.to_execution_path(p.as_ref())).collect()
    }
}

/// Replace `from` with `to` when it is a whole leading path component run.
/// Paths outside the namespace pass through untouched, which makes both
/// conversions idempotent.
fn swap_prefix(path: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return path.to_string();
    }
    match path.strip_prefix(from) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{}{}", to, rest),
        _ => path.to_string(),
    }
}

fn trim_trailing_slash(mut value: String) -> String {
    while value.len() > 1 && value.ends_with('/') {
        value.pop();
    }
    value
}

/// Sanitize a name for use inside a filename by replacing invalid characters with underscores
pub fn sanitize_filename(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '];

    let mut sanitized = name.trim().to_string();
    for c in invalid_chars {
        sanitized = sanitized.replace(c, "_");
    }
    sanitized
}

/// File stem of a measurement set path (`/a/b/uid___X.ms` -> `uid___X`).
pub fn product_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespaces() -> PathNamespaces {
        PathNamespaces::new("/mnt/vm/project", "/arc/projects/project")
    }

    #[test]
    fn test_storage_and_execution_conversion() {
        let ns = namespaces();
        assert_eq!(
            ns.to_storage_path("/mnt/vm/project/datasets/uid___A_B_C"),
            "/arc/projects/project/datasets/uid___A_B_C"
        );
        assert_eq!(
            ns.to_execution_path("/arc/projects/project/datasets/uid___A_B_C"),
            PathBuf::from("/mnt/vm/project/datasets/uid___A_B_C")
        );
    }

    #[test]
    fn test_conversion_is_idempotent_and_component_aware() {
        let ns = namespaces();
        let stored = "/arc/projects/project/datasets/x.ms";
        assert_eq!(ns.to_storage_path(stored), stored);
        // A sibling directory sharing the textual prefix is not part of the namespace
        assert_eq!(ns.to_storage_path("/mnt/vm/project2/x"), "/mnt/vm/project2/x");
        assert_eq!(ns.to_storage_path("/mnt/vm/project"), "/arc/projects/project");
    }

    #[test]
    fn test_list_conversion_preserves_order() {
        let ns = namespaces();
        let converted = ns.to_execution_paths(&["/arc/projects/project/b", "/arc/projects/project/a"]);
        assert_eq!(
            converted,
            vec![PathBuf::from("/mnt/vm/project/b"), PathBuf::from("/mnt/vm/project/a")]
        );
    }

    #[test]
    fn test_sanitize_and_stem() {
        assert_eq!(sanitize_filename(" NGC 1333/IRAS4A "), "NGC_1333_IRAS4A");
        assert_eq!(product_stem("/data/uid___A002_X1_X2.ms"), "uid___A002_X1_X2");
    }
}
