//! [`Artifact`] — a versioned blob stored under the taskspace root.

use serde::{Deserialize, Serialize};

/// Metadata for a single version of a written artifact.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Path relative to the taskspace root (e.g. `"report.md"`).
    pub path: String,
    /// Size in bytes of this version.
    pub size: u64,
    /// Version number; every write creates a new version (append-only).
    pub version: u64,
    /// Creation timestamp of the first version, milliseconds since epoch.
    pub created_at: u64,
    /// Timestamp this version was written, milliseconds since epoch.
    pub modified_at: u64,
    /// Best-effort MIME type, inferred from the path extension.
    pub mime_hint: Option<String>,
}

impl Artifact {
    /// Construct artifact metadata for a freshly written version.
    pub fn new(path: impl Into<String>, size: u64, version: u64, timestamp: u64) -> Self {
        let path = path.into();
        let mime_hint = mime_hint_for(&path);
        Self {
            path,
            size,
            version,
            created_at: timestamp,
            modified_at: timestamp,
            mime_hint,
        }
    }
}

/// Best-effort MIME type from a file extension. Returns `None` for unknown
/// extensions rather than guessing — callers treat `None` as
/// `application/octet-stream`.
pub fn mime_hint_for(path: &str) -> Option<String> {
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "md" | "markdown" => "text/markdown",
        "txt" => "text/plain",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime.to_string())
}

/// Reject artifact paths that escape the taskspace root: absolute paths
/// and any `..` component. Used by both the taskspace store and the
/// `workspace_write` tool policy check (§4.3, §8 boundary behavior).
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let p = std::path::Path::new(path);
    if p.is_absolute() {
        return false;
    }
    !p.components()
        .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_hint_known_extension() {
        assert_eq!(mime_hint_for("report.md").as_deref(), Some("text/markdown"));
    }

    #[test]
    fn mime_hint_unknown_extension_is_none() {
        assert_eq!(mime_hint_for("binary.xyz"), None);
    }

    #[test]
    fn rejects_parent_dir_escape() {
        assert!(!is_safe_relative_path("../x"));
        assert!(!is_safe_relative_path("a/../../b"));
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(!is_safe_relative_path("/etc/passwd"));
    }

    #[test]
    fn accepts_plain_relative_path() {
        assert!(is_safe_relative_path("sources.md"));
        assert!(is_safe_relative_path("notes/draft.md"));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(!is_safe_relative_path(""));
    }
}
