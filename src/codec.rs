//! Translation between absolute storage paths and external-storage tree URIs.
//!
//! The provider addresses a granted subtree as
//! `content://com.android.externalstorage.documents/tree/<volume>%3A<rest>`,
//! where `<rest>` is the volume-relative path with every `/` written as `%2F`.
//! The built-in volume is always called `primary` on the URI side, whatever
//! its mount directory is called on the path side.
//!
//! URIs produced here are only good for requesting and validating a grant.
//! Nodes below the root are addressed by the provider's own document ids.

use crate::errors::{TreeError, TreeResult};

pub const TREE_URI_PREFIX: &str = "content://com.android.externalstorage.documents/tree/";
pub const DOCUMENT_MARKER: &str = "/document/";
pub const ENCODED_COLON: &str = "%3A";
pub const ENCODED_SLASH: &str = "%2F";
pub const PRIMARY_VOLUME: &str = "primary";
pub const DEFAULT_PRIMARY_STORAGE: &str = "/storage/emulated/0";

/// Absolute path of the primary external storage mount, split into the
/// mount prefix (`/storage/`) and the primary volume directory (`emulated/0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    path: String,
    mount_prefix: String,
    primary_dir: String,
}

impl StorageRoot {
    pub fn new(path: &str) -> TreeResult<Self> {
        let trimmed = path.trim_matches('/');
        match trimmed.split_once('/') {
            Some((mount, primary)) if !mount.is_empty() && !primary.trim_matches('/').is_empty() => {
                Ok(Self {
                    path: format!("/{trimmed}"),
                    mount_prefix: format!("/{mount}/"),
                    primary_dir: primary.to_string(),
                })
            }
            _ => Err(TreeError::InvalidPath(format!(
                "storage root must name a mount and a volume: {path}"
            ))),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Everything up to and including the second `/`, e.g. `/storage/`.
    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    /// The primary volume directory below the mount, e.g. `emulated/0`.
    pub fn primary_dir(&self) -> &str {
        &self.primary_dir
    }

    pub fn android_dir(&self) -> String {
        format!("{}/Android", self.path)
    }

    pub fn android_data_dir(&self) -> String {
        format!("{}/Android/data", self.path)
    }

    pub fn android_obb_dir(&self) -> String {
        format!("{}/Android/obb", self.path)
    }
}

impl Default for StorageRoot {
    fn default() -> Self {
        Self {
            path: DEFAULT_PRIMARY_STORAGE.to_string(),
            mount_prefix: "/storage/".to_string(),
            primary_dir: "emulated/0".to_string(),
        }
    }
}

/// Ensure exactly one leading and one trailing `/`.
pub fn normalize(path: &str) -> String {
    let inner = path.trim_matches('/');
    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{inner}/")
    }
}

/// Drop leading and trailing slashes.
pub fn strip_slashes(path: &str) -> &str {
    path.trim_matches('/')
}

/// Non-empty components of a slash separated path.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[derive(Debug, Clone, Default)]
pub struct PathCodec {
    root: StorageRoot,
}

impl PathCodec {
    pub fn new(root: StorageRoot) -> Self {
        Self { root }
    }

    pub fn storage_root(&self) -> &StorageRoot {
        &self.root
    }

    /// Map an absolute path under a storage volume to its tree URI.
    pub fn path_to_uri(&self, path: &str) -> TreeResult<String> {
        let path = normalize(path);
        let content = path.strip_prefix(self.root.mount_prefix()).ok_or_else(|| {
            TreeError::InvalidPath(format!(
                "{path} is not under {}",
                self.root.mount_prefix()
            ))
        })?;

        let primary = format!("{}/", self.root.primary_dir());
        let content = match content.strip_prefix(&primary) {
            Some(rest) => format!("{PRIMARY_VOLUME}/{rest}"),
            None => content.to_string(),
        };

        let (volume, rest) = content
            .split_once('/')
            .filter(|(volume, _)| !volume.is_empty())
            .ok_or_else(|| TreeError::InvalidPath(format!("{path} names no storage volume")))?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        Ok(format!(
            "{TREE_URI_PREFIX}{volume}{ENCODED_COLON}{}",
            rest.replace('/', ENCODED_SLASH)
        ))
    }

    /// Map a granted tree URI (optionally carrying a `/document/` part) back
    /// to an absolute path. Arbitrary document URIs from a traversal are not
    /// guaranteed to invert.
    pub fn uri_to_path(&self, uri: &str) -> TreeResult<String> {
        let body = uri
            .strip_prefix(TREE_URI_PREFIX)
            .ok_or_else(|| TreeError::InvalidUri(format!("{uri} is not a tree uri")))?;
        let colon = body
            .find(ENCODED_COLON)
            .ok_or_else(|| TreeError::InvalidUri(format!("{uri} has no volume separator")))?;
        let volume = &body[..colon];
        if volume.is_empty() || volume.contains('/') {
            return Err(TreeError::InvalidUri(format!("{uri} names no volume")));
        }

        let marker = format!("{DOCUMENT_MARKER}{volume}{ENCODED_COLON}");
        let encoded = match uri.find(&marker) {
            Some(at) => &uri[at + marker.len()..],
            None => &body[colon + ENCODED_COLON.len()..],
        };
        let rest = encoded.replace(ENCODED_SLASH, "/");

        let volume_dir = if volume == PRIMARY_VOLUME {
            self.root.primary_dir()
        } else {
            volume
        };
        Ok(format!("{}{volume_dir}/{rest}", self.root.mount_prefix()))
    }
}

/// A node address in the provider's own scheme:
/// `tree/<tree id>/document/<volume>%3A<segments joined by %2F>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAddress {
    pub tree_id: String,
    pub volume: String,
    pub segments: Vec<String>,
}

impl DocumentAddress {
    /// Parse a tree URI or a document URI below one. Without a `/document/`
    /// part the address is the tree root itself.
    pub fn parse(uri: &str) -> TreeResult<Self> {
        let body = uri
            .strip_prefix(TREE_URI_PREFIX)
            .ok_or_else(|| TreeError::InvalidUri(format!("{uri} is not a tree uri")))?;
        let tree_id = body.split('/').next().unwrap_or_default();
        let document_id = match body.find(DOCUMENT_MARKER) {
            Some(at) => &body[at + DOCUMENT_MARKER.len()..],
            None => tree_id,
        };
        let (volume, rest) = document_id
            .split_once(ENCODED_COLON)
            .filter(|(volume, _)| !volume.is_empty())
            .ok_or_else(|| TreeError::InvalidUri(format!("{uri} has no volume separator")))?;
        Ok(Self {
            tree_id: tree_id.to_string(),
            volume: volume.to_string(),
            segments: rest
                .split(ENCODED_SLASH)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn to_uri(&self) -> String {
        format!(
            "{TREE_URI_PREFIX}{}{DOCUMENT_MARKER}{}{ENCODED_COLON}{}",
            self.tree_id,
            self.volume,
            self.segments.join(ENCODED_SLASH)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_address_from_tree_and_document_uris() {
        let tree = DocumentAddress::parse(
            "content://com.android.externalstorage.documents/tree/primary%3ADownload",
        )
        .unwrap();
        assert_eq!(tree.tree_id, "primary%3ADownload");
        assert_eq!(tree.volume, "primary");
        assert_eq!(tree.segments, vec!["Download"]);

        let doc = DocumentAddress::parse(&DocumentAddress {
            segments: vec!["Download".into(), "a".into(), "b.txt".into()],
            ..tree.clone()
        }
        .to_uri())
        .unwrap();
        assert_eq!(doc.tree_id, "primary%3ADownload");
        assert_eq!(doc.segments, vec!["Download", "a", "b.txt"]);

        assert!(DocumentAddress::parse("content://other/tree/x").is_err());
    }

    #[test]
    fn storage_root_splits_mount_and_primary() {
        let root = StorageRoot::new("/storage/emulated/0/").unwrap();
        assert_eq!(root.path(), "/storage/emulated/0");
        assert_eq!(root.mount_prefix(), "/storage/");
        assert_eq!(root.primary_dir(), "emulated/0");
        assert_eq!(root.android_dir(), "/storage/emulated/0/Android");
        assert_eq!(root.android_obb_dir(), "/storage/emulated/0/Android/obb");
        assert_eq!(root, StorageRoot::default());
    }

    #[test]
    fn storage_root_needs_two_levels() {
        assert!(StorageRoot::new("/storage").is_err());
        assert!(StorageRoot::new("/").is_err());
        assert!(StorageRoot::new("").is_err());
    }

    #[test]
    fn normalize_adds_single_slashes() {
        assert_eq!(normalize("a/b"), "/a/b/");
        assert_eq!(normalize("/a/b/"), "/a/b/");
        assert_eq!(normalize("//a/b//"), "/a/b/");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("///"), "/");
        assert_eq!(strip_slashes("/a/b/"), "a/b");
        assert_eq!(segments("//a//b/"), vec!["a", "b"]);
    }

    #[test]
    fn primary_volume_is_rewritten() {
        let codec = PathCodec::default();
        assert_eq!(
            codec.path_to_uri("/storage/emulated/0/Android/data").unwrap(),
            "content://com.android.externalstorage.documents/tree/primary%3AAndroid%2Fdata"
        );
        assert_eq!(
            codec.path_to_uri("/storage/emulated/0").unwrap(),
            "content://com.android.externalstorage.documents/tree/primary%3A"
        );
    }

    #[test]
    fn removable_volume_kept_verbatim() {
        let codec = PathCodec::default();
        assert_eq!(
            codec.path_to_uri("/storage/6238-3332/").unwrap(),
            "content://com.android.externalstorage.documents/tree/6238-3332%3A"
        );
        assert_eq!(
            codec.path_to_uri("/storage/6238-3332/Android/").unwrap(),
            "content://com.android.externalstorage.documents/tree/6238-3332%3AAndroid"
        );
    }

    #[test]
    fn primary_dir_match_is_segment_aware() {
        let codec = PathCodec::default();
        let uri = codec.path_to_uri("/storage/emulated/01/x").unwrap();
        assert!(uri.ends_with("tree/emulated%3A01%2Fx"));
    }

    #[test]
    fn paths_outside_storage_rejected() {
        let codec = PathCodec::default();
        assert!(matches!(codec.path_to_uri("/sdcard/Download"), Err(TreeError::InvalidPath(_))));
        assert!(matches!(codec.path_to_uri("/storage/"), Err(TreeError::InvalidPath(_))));
        assert!(matches!(codec.path_to_uri("/storage//x"), Err(TreeError::InvalidPath(_))));
    }

    #[test]
    fn tree_uri_back_to_path() {
        let codec = PathCodec::default();
        let path = codec
            .uri_to_path("content://com.android.externalstorage.documents/tree/primary%3ADownload%2Ftest")
            .unwrap();
        assert_eq!(path, "/storage/emulated/0/Download/test");

        let path = codec
            .uri_to_path("content://com.android.externalstorage.documents/tree/6238-3332%3A")
            .unwrap();
        assert_eq!(path, "/storage/6238-3332/");
    }

    #[test]
    fn document_part_wins_over_tree_part() {
        let codec = PathCodec::default();
        let path = codec
            .uri_to_path(
                "content://com.android.externalstorage.documents/tree/primary%3ADownload/document/primary%3ADownload%2Fa%2Fb.txt",
            )
            .unwrap();
        assert_eq!(path, "/storage/emulated/0/Download/a/b.txt");
    }

    #[test]
    fn foreign_uri_rejected() {
        let codec = PathCodec::default();
        assert!(matches!(
            codec.uri_to_path("content://media/external/images"),
            Err(TreeError::InvalidUri(_))
        ));
        assert!(matches!(
            codec.uri_to_path("content://com.android.externalstorage.documents/tree/primary"),
            Err(TreeError::InvalidUri(_))
        ));
        assert!(matches!(
            codec.uri_to_path("content://com.android.externalstorage.documents/tree/Download/document/primary%3ADownload"),
            Err(TreeError::InvalidUri(_))
        ));
    }
}
