//! Path resolution against a live document tree.
//!
//! Every call starts again from the root handle of the permission URI and
//! walks the remaining segments. [`TreeResolver::resolve`] creates whatever
//! is missing on the way; [`TreeResolver::lookup`] only reads.

use tracing::debug;

use crate::codec::PathCodec;
use crate::errors::{TreeError, TreeResult};
use crate::node::{DocumentNode, DocumentProvider, NodeKind, UNKNOWN_MIME_TYPE};
use crate::scope::PermissionScope;

pub struct TreeResolver<'a, P: DocumentProvider> {
    provider: &'a P,
    codec: &'a PathCodec,
    scope: &'a PermissionScope,
}

impl<'a, P: DocumentProvider> TreeResolver<'a, P> {
    pub fn new(provider: &'a P, codec: &'a PathCodec, scope: &'a PermissionScope) -> Self {
        Self {
            provider,
            codec,
            scope,
        }
    }

    /// Fresh handle for the permission root.
    pub fn root(&self) -> TreeResult<P::Node> {
        let uri = self.scope.permission_uri()?;
        self.provider
            .tree_root(uri)?
            .ok_or_else(|| TreeError::NotFound(uri.to_string()))
    }

    /// Resolve `path` to a node, creating missing directories on the way and
    /// a terminal node of `kind` if it does not exist yet.
    pub fn resolve(&self, path: &str, kind: NodeKind) -> TreeResult<P::Node> {
        let scoped = self.scope.authorize(self.codec, path)?;
        let root = self.root()?;
        if scoped.segments.is_empty() {
            return Ok(root);
        }
        walk(root, &scoped.segments, kind)
    }

    /// Resolve `path` without touching the tree. `Ok(None)` when some segment
    /// does not exist.
    pub fn lookup(&self, path: &str) -> TreeResult<Option<P::Node>> {
        let scoped = self.scope.authorize(self.codec, path)?;
        let root = self.root()?;
        find(root, &scoped.segments)
    }
}

/// Walk `segments` below `start`, creating what is missing. Only the last
/// segment can become a file; everything before it is a directory.
pub fn walk<N: DocumentNode>(start: N, segments: &[&str], kind: NodeKind) -> TreeResult<N> {
    let mut current = start;
    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        current = match child_named(&current, segment)? {
            Some(child) => child,
            None if last && kind == NodeKind::File => {
                debug!(parent = %current.uri(), name = %segment, "creating file");
                current.create_file(UNKNOWN_MIME_TYPE, segment)?
            }
            None => {
                debug!(parent = %current.uri(), name = %segment, "creating directory");
                current.create_directory(segment)?
            }
        };
    }
    Ok(current)
}

/// Walk `segments` below `start` without creating anything.
pub fn find<N: DocumentNode>(start: N, segments: &[&str]) -> TreeResult<Option<N>> {
    let mut current = start;
    for segment in segments {
        match child_named(&current, segment)? {
            Some(child) => current = child,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

// Exact, case-sensitive name match. A file in the middle of a path cannot be
// descended into.
fn child_named<N: DocumentNode>(node: &N, name: &str) -> TreeResult<Option<N>> {
    if !node.is_directory() {
        return Err(TreeError::NotADirectory(format!(
            "{} while looking for {name}",
            node.uri()
        )));
    }
    Ok(node
        .list_children()?
        .into_iter()
        .find(|child| child.name().as_deref() == Some(name)))
}
