//! Path-addressed access to one granted document tree.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::codec::{PathCodec, StorageRoot};
use crate::copy::{copy_stream, DEFAULT_BUFFER_SIZE};
use crate::errors::{TreeError, TreeResult};
use crate::grant::{GrantBroker, GrantOutcome, GrantToken, PendingGrant};
use crate::node::{DocumentNode, DocumentProvider, NodeKind, PickerLaunch, UriAccess, UriPermission};
use crate::resolver::TreeResolver;
use crate::scope::PermissionScope;

/// Tree picker (`ACTION_OPEN_DOCUMENT_TREE` with an initial location).
pub const API_TREE_PICKER: u32 = 26;
/// Persistable URI permissions.
pub const API_PERSISTABLE_GRANTS: u32 = 19;
/// All-files access exists as a separate permission from here on.
pub const API_ALL_FILES_ACCESS: u32 = 30;

#[derive(Debug)]
pub struct ScopedTree<P: DocumentProvider> {
    provider: P,
    codec: PathCodec,
    scope: PermissionScope,
    grants: GrantBroker,
    buffer_size: usize,
}

impl<P: DocumentProvider> ScopedTree<P> {
    pub fn new(provider: P, storage: StorageRoot, permission_dir: &str) -> Self {
        let codec = PathCodec::new(storage);
        let scope = PermissionScope::new(&codec, permission_dir);
        Self {
            provider,
            codec,
            scope,
            grants: GrantBroker::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    pub fn scope(&self) -> &PermissionScope {
        &self.scope
    }

    fn resolver(&self) -> TreeResolver<'_, P> {
        TreeResolver::new(&self.provider, &self.codec, &self.scope)
    }

    fn require_api(&self, required: u32, what: &str) -> TreeResult<()> {
        let actual = self.provider.api_level();
        if actual < required {
            warn!(required, actual, "{what} unavailable on this api level");
            return Err(TreeError::PlatformVersion { required, actual });
        }
        Ok(())
    }

    /// Whether the permission root is reachable and writable.
    pub fn is_permitted(&self) -> bool {
        match self.resolver().root() {
            Ok(root) => root.can_write(),
            Err(e) => {
                if !self.scope.is_valid() {
                    error!(error = %e, "permission check on an unusable scope");
                } else {
                    debug!(error = %e, "permission root unavailable");
                }
                false
            }
        }
    }

    pub fn has_all_files_access(&self) -> bool {
        self.provider.api_level() < API_ALL_FILES_ACCESS || self.provider.has_all_files_access()
    }

    /// Ask for all-files access. Older platforms grant it with the storage
    /// permission, so this is a no-op there.
    pub fn request_all_files_access(&mut self) -> TreeResult<()> {
        if self.provider.api_level() < API_ALL_FILES_ACCESS {
            debug!("all-files access implied on this api level");
            return Ok(());
        }
        self.provider.request_all_files_access()
    }

    /// Launch the tree picker at the permission root. The returned pending
    /// grant is completed by the picker, either on the spot or later through
    /// [`ScopedTree::on_grant_result`].
    pub fn request_permission(&mut self) -> TreeResult<PendingGrant> {
        let uri = self.scope.permission_uri()?.to_string();
        self.require_api(API_TREE_PICKER, "tree picker")?;
        if self.provider.tree_root(&uri)?.is_none() {
            return Err(TreeError::NotFound(uri));
        }

        let pending = self.grants.register(&uri);
        let launch = match self.provider.launch_tree_picker(pending.request()) {
            Ok(launch) => launch,
            Err(e) => {
                self.grants.cancel(pending.token());
                return Err(e);
            }
        };
        if let PickerLaunch::Completed(outcome) = launch {
            self.grants.complete(pending.token(), outcome)?;
        }
        info!(token = %pending.token(), uri = %uri, "tree picker launched");
        Ok(pending)
    }

    /// Platform callback for a picker launched by [`ScopedTree::request_permission`].
    pub fn on_grant_result(&mut self, token: GrantToken, outcome: GrantOutcome) -> TreeResult<()> {
        self.grants.complete(token, outcome)
    }

    /// Persist the grant the picker returned and rebind the scope to the
    /// tree the user actually picked.
    pub fn save_permission(&mut self, mut pending: PendingGrant) -> TreeResult<UriPermission> {
        let (uri, access) = match pending.try_take()? {
            GrantOutcome::Granted { uri, access } => (uri, access),
            GrantOutcome::Dismissed => {
                return Err(TreeError::Grant("picker dismissed without a tree".into()));
            }
        };

        let node = self
            .provider
            .tree_root(&uri)?
            .ok_or_else(|| TreeError::NotFound(uri.clone()))?;
        if !node.can_write() {
            return Err(TreeError::NotWritable(uri));
        }
        self.require_api(API_PERSISTABLE_GRANTS, "persistable grants")?;

        let scope = PermissionScope::from_granted_uri(&self.codec, &uri)?;
        let access = access.intersect(UriAccess::READ_WRITE);
        self.provider.take_persistable_permission(&uri, access)?;
        self.scope = scope;
        info!(uri = %uri, read = access.read, write = access.write, "grant persisted");
        Ok(UriPermission { uri, access })
    }

    /// Picker launches still waiting for their result.
    pub fn pending_grants(&self) -> usize {
        self.grants.pending_count()
    }

    pub fn persisted_permissions(&self) -> Vec<UriPermission> {
        self.provider.persisted_permissions()
    }

    pub fn root_node(&self) -> TreeResult<P::Node> {
        self.resolver().root()
    }

    /// Node for `path`, creating it and any missing parent directories.
    pub fn resolve(&self, path: &str, kind: NodeKind) -> TreeResult<P::Node> {
        self.resolver().resolve(path, kind)
    }

    /// Node for `path` if it already exists. Never creates anything.
    pub fn lookup(&self, path: &str) -> TreeResult<Option<P::Node>> {
        self.resolver().lookup(path)
    }

    pub fn exists(&self, path: &str) -> TreeResult<bool> {
        Ok(self.lookup(path)?.is_some())
    }

    pub fn create_directory(&self, path: &str) -> TreeResult<P::Node> {
        self.resolve(path, NodeKind::Directory)
    }

    pub fn create_file(&self, path: &str) -> TreeResult<P::Node> {
        self.resolve(path, NodeKind::File)
    }

    fn existing(&self, path: &str, kind: NodeKind) -> TreeResult<P::Node> {
        match self.lookup(path)? {
            Some(node) if node.kind() == kind => Ok(node),
            Some(node) => Err(TreeError::NodeNotFound(format!(
                "{path} is a {}, not a {kind}",
                node.kind()
            ))),
            None => Err(TreeError::NodeNotFound(path.to_string())),
        }
    }

    pub fn delete(&self, path: &str, kind: NodeKind) -> TreeResult<()> {
        let node = self.existing(path, kind)?;
        node.delete()?;
        info!(path = %path, %kind, "deleted");
        Ok(())
    }

    /// Rename the node at `path` in place and return its updated handle.
    pub fn rename(&self, path: &str, kind: NodeKind, new_name: &str) -> TreeResult<P::Node> {
        let mut node = self.existing(path, kind)?;
        node.rename(new_name)?;
        info!(path = %path, new_name = %new_name, "renamed");
        Ok(node)
    }

    pub fn open_read(&self, path: &str) -> TreeResult<Box<dyn Read>> {
        self.create_file(path)?.open_read()
    }

    pub fn open_write(&self, path: &str) -> TreeResult<Box<dyn Write>> {
        self.create_file(path)?.open_write()
    }

    pub fn copy_to_file(&self, from: &P::Node, to: &Path) -> TreeResult<u64> {
        copy_stream(from.open_read()?, File::create(to)?, self.buffer_size)
    }

    pub fn copy_from_file(&self, from: &Path, to: &P::Node) -> TreeResult<u64> {
        copy_stream(File::open(from)?, to.open_write()?, self.buffer_size)
    }

    pub fn copy_node(&self, from: &P::Node, to: &P::Node) -> TreeResult<u64> {
        copy_stream(from.open_read()?, to.open_write()?, self.buffer_size)
    }

    pub fn path_to_uri(&self, path: &str) -> TreeResult<String> {
        self.codec.path_to_uri(path)
    }

    pub fn uri_to_path(&self, uri: &str) -> TreeResult<String> {
        self.codec.uri_to_path(uri)
    }
}
