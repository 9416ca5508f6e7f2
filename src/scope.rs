use tracing::{error, info};

use crate::codec::{normalize, segments, PathCodec};
use crate::errors::{TreeError, TreeResult};

/// The single directory tree a caller may manipulate.
///
/// A permission directory that is not under a storage volume leaves the
/// scope without a URI; every operation against it then fails with
/// `InvalidPath`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionScope {
    permission_path: String,
    permission_uri: Option<String>,
}

/// A query path that passed the scope check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedPath<'a> {
    pub normalized: String,
    pub segments: Vec<&'a str>,
}

impl PermissionScope {
    pub fn new(codec: &PathCodec, permission_dir: &str) -> Self {
        let permission_path = normalize(permission_dir);
        let permission_uri = match codec.path_to_uri(&permission_path) {
            Ok(uri) => Some(uri),
            Err(e) => {
                error!(dir = %permission_dir, error = %e, "permission directory is unusable");
                None
            }
        };
        Self {
            permission_path,
            permission_uri,
        }
    }

    /// Scope for whatever tree the platform actually granted.
    pub fn from_granted_uri(codec: &PathCodec, uri: &str) -> TreeResult<Self> {
        let permission_path = normalize(&codec.uri_to_path(uri)?);
        info!(path = %permission_path, uri = %uri, "scope bound to granted tree");
        Ok(Self {
            permission_path,
            permission_uri: Some(uri.to_string()),
        })
    }

    pub fn permission_path(&self) -> &str {
        &self.permission_path
    }

    pub fn permission_uri(&self) -> TreeResult<&str> {
        self.permission_uri.as_deref().ok_or_else(|| {
            TreeError::InvalidPath(format!(
                "permission directory {} is not under a storage volume",
                self.permission_path
            ))
        })
    }

    pub fn is_valid(&self) -> bool {
        self.permission_uri.is_some()
    }

    /// Check that `path` lies inside this scope and split off the part below
    /// the permission root. Both the URI prefix and the path prefix must
    /// match, so `/a/app` does not cover `/a/apple`.
    pub fn authorize<'a>(&self, codec: &PathCodec, path: &'a str) -> TreeResult<ScopedPath<'a>> {
        let permission_uri = self.permission_uri()?;
        let normalized = normalize(path);
        let uri = codec.path_to_uri(&normalized)?;
        if !uri.starts_with(permission_uri) || !normalized.starts_with(&self.permission_path) {
            return Err(TreeError::NotAuthorized(format!(
                "{normalized} is outside {}",
                self.permission_path
            )));
        }

        let mut relative = segments(path);
        let depth = segments(&self.permission_path).len();
        relative.drain(..depth.min(relative.len()));
        Ok(ScopedPath {
            normalized,
            segments: relative,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_dir_leaves_scope_unusable() {
        let codec = PathCodec::default();
        let scope = PermissionScope::new(&codec, "/data/local/tmp");
        assert!(!scope.is_valid());
        assert_eq!(scope.permission_path(), "/data/local/tmp/");
        assert!(matches!(scope.permission_uri(), Err(TreeError::InvalidPath(_))));
        assert!(matches!(
            scope.authorize(&codec, "/data/local/tmp/a"),
            Err(TreeError::InvalidPath(_))
        ));
    }

    #[test]
    fn authorize_splits_relative_segments() {
        let codec = PathCodec::default();
        let scope = PermissionScope::new(&codec, "/storage/emulated/0/Download");
        let scoped = scope
            .authorize(&codec, "/storage/emulated/0/Download/test//a.txt")
            .unwrap();
        assert_eq!(scoped.normalized, "/storage/emulated/0/Download/test//a.txt/");
        assert_eq!(scoped.segments, vec!["test", "a.txt"]);

        let root = scope.authorize(&codec, "storage/emulated/0/Download/").unwrap();
        assert!(root.segments.is_empty());
    }

    #[test]
    fn sibling_with_shared_prefix_not_authorized() {
        let codec = PathCodec::default();
        let scope = PermissionScope::new(&codec, "/storage/emulated/0/app");
        assert!(matches!(
            scope.authorize(&codec, "/storage/emulated/0/apple/x"),
            Err(TreeError::NotAuthorized(_))
        ));
        assert!(matches!(
            scope.authorize(&codec, "/storage/emulated/0/other"),
            Err(TreeError::NotAuthorized(_))
        ));
    }

    #[test]
    fn volume_root_scope_covers_volume() {
        let codec = PathCodec::default();
        let scope = PermissionScope::new(&codec, "/storage/6238-3332");
        let scoped = scope.authorize(&codec, "/storage/6238-3332/DCIM/a.jpg").unwrap();
        assert_eq!(scoped.segments, vec!["DCIM", "a.jpg"]);
        assert!(scope.authorize(&codec, "/storage/emulated/0/DCIM").is_err());
    }

    #[test]
    fn granted_uri_rebinds_path() {
        let codec = PathCodec::default();
        let scope = PermissionScope::from_granted_uri(
            &codec,
            "content://com.android.externalstorage.documents/tree/primary%3ADocuments",
        )
        .unwrap();
        assert_eq!(scope.permission_path(), "/storage/emulated/0/Documents/");
        assert!(scope.authorize(&codec, "/storage/emulated/0/Documents/x").is_ok());
    }
}
