//! The capability seam between the resolver and the storage platform.
//!
//! A [`DocumentProvider`] hands out [`DocumentNode`] handles for granted tree
//! URIs, runs the directory picker and keeps the persisted grants. Nothing in
//! this crate holds on to a node between calls.

use std::fmt;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::errors::TreeResult;
use crate::grant::{GrantOutcome, GrantRequest};

/// Media type passed when creating a file whose type the caller does not know.
pub const UNKNOWN_MIME_TYPE: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
        }
    }
}

pub trait DocumentNode: Clone + fmt::Debug {
    /// Display name; providers may not know it for a stale handle.
    fn name(&self) -> Option<String>;
    fn uri(&self) -> String;
    fn kind(&self) -> NodeKind;
    fn can_write(&self) -> bool;
    fn list_children(&self) -> TreeResult<Vec<Self>>;
    fn create_file(&self, mime_type: &str, name: &str) -> TreeResult<Self>;
    fn create_directory(&self, name: &str) -> TreeResult<Self>;
    /// Removes the node; directories go with all their descendants.
    fn delete(&self) -> TreeResult<()>;
    fn rename(&mut self, new_name: &str) -> TreeResult<()>;
    fn open_read(&self) -> TreeResult<Box<dyn Read>>;
    /// Opens for writing, truncating existing content.
    fn open_write(&self) -> TreeResult<Box<dyn Write>>;

    fn is_directory(&self) -> bool {
        self.kind() == NodeKind::Directory
    }

    fn is_file(&self) -> bool {
        self.kind() == NodeKind::File
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UriAccess {
    pub read: bool,
    pub write: bool,
}

impl UriAccess {
    pub const READ_WRITE: UriAccess = UriAccess {
        read: true,
        write: true,
    };

    pub fn intersect(self, other: UriAccess) -> UriAccess {
        UriAccess {
            read: self.read && other.read,
            write: self.write && other.write,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriPermission {
    pub uri: String,
    pub access: UriAccess,
}

/// How the platform answered a picker launch.
#[derive(Debug)]
pub enum PickerLaunch {
    /// The answer arrives later through the platform's result callback.
    Pending,
    /// The platform answered on the spot.
    Completed(GrantOutcome),
}

pub trait DocumentProvider {
    type Node: DocumentNode;

    fn api_level(&self) -> u32;

    /// Handle for the root of a granted tree, `None` when the platform knows
    /// no such tree (revoked grant, unmounted volume).
    fn tree_root(&self, tree_uri: &str) -> TreeResult<Option<Self::Node>>;

    fn launch_tree_picker(&mut self, request: &GrantRequest) -> TreeResult<PickerLaunch>;

    fn take_persistable_permission(&mut self, uri: &str, access: UriAccess) -> TreeResult<()>;

    fn persisted_permissions(&self) -> Vec<UriPermission>;

    fn has_all_files_access(&self) -> bool;

    fn request_all_files_access(&mut self) -> TreeResult<()>;
}
