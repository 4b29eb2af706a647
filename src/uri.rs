//! Conversions between document URIs and filesystem paths.

use std::path::{Component, Path, PathBuf};

use tower_lsp::lsp_types::Url;

use crate::error::{FeatureError, FeatureResult};

/// Filesystem path for a `file:` URI or a plain path string.
///
/// Returns `None` for blank input and for non-file URIs.
pub fn to_filesystem_path(uri_or_path: &str) -> Option<PathBuf> {
    let trimmed = uri_or_path.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with("file:") {
        return Url::parse(trimmed).ok()?.to_file_path().ok();
    }
    if trimmed.contains("://") {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

/// Absolute, lexically normalized path used as a cache and identity key.
pub fn canonical_path(uri_or_path: &str) -> Option<PathBuf> {
    let path = to_filesystem_path(uri_or_path)?;
    let absolute = std::path::absolute(&path).ok()?;
    Some(normalize(&absolute))
}

/// Canonical key for a document URI.
pub fn canonical_uri_path(uri: &Url) -> Option<PathBuf> {
    canonical_path(uri.as_str())
}

/// `file:` URI for a path.
pub fn path_to_uri(path: &Path) -> Option<Url> {
    let absolute = std::path::absolute(path).ok()?;
    Url::from_file_path(normalize(&absolute)).ok()
}

/// Read a document from disk.
pub fn read_document(uri: &Url) -> FeatureResult<String> {
    let path = uri
        .to_file_path()
        .map_err(|_| FeatureError::Io {
            path: PathBuf::from(uri.as_str()),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file URI"),
        })?;
    std::fs::read_to_string(&path).map_err(|source| FeatureError::Io { path, source })
}

/// Remove `.` and resolve `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_uri_to_path() {
        let path = to_filesystem_path("file:///tmp/models/a.ili").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/models/a.ili"));
    }

    #[test]
    fn test_non_file_uris() {
        assert!(to_filesystem_path("untitled:Untitled-1").is_none());
        assert!(to_filesystem_path("http://models.interlis.ch/a.ili").is_none());
        assert!(to_filesystem_path("   ").is_none());
    }

    #[test]
    fn test_canonical_path_normalizes() {
        let a = canonical_path("/tmp/models/../models/./a.ili").unwrap();
        let b = canonical_path("file:///tmp/models/a.ili").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/tmp/models/a.ili"));
    }

    #[test]
    fn test_path_to_uri() {
        let uri = path_to_uri(Path::new("/tmp/x/../a.ili")).unwrap();
        assert_eq!(uri.as_str(), "file:///tmp/a.ili");
    }

    #[test]
    fn test_read_missing_document() {
        let uri = Url::parse("file:///definitely/not/here.ili").unwrap();
        let err = read_document(&uri).unwrap_err();
        assert!(matches!(err, FeatureError::Io { .. }));
    }
}
