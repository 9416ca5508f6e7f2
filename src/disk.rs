//! Document provider backed by a host directory.
//!
//! The host directory stands in for the storage mount (`/storage/`): the
//! primary volume lives under `<host>/emulated/0`, any other volume under
//! `<host>/<volume id>`. Persisted grants are kept in a JSON file.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::{DocumentAddress, StorageRoot, PRIMARY_VOLUME};
use crate::errors::{TreeError, TreeResult};
use crate::grant::{GrantOutcome, GrantRequest};
use crate::node::{DocumentNode, DocumentProvider, NodeKind, PickerLaunch, UriAccess, UriPermission};

#[derive(Debug, Clone)]
pub struct DiskNode {
    address: DocumentAddress,
    host_path: PathBuf,
    // Canonical host path of the tree root this node was reached from.
    tree_root: PathBuf,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\0')
}

fn check_name(name: &str) -> TreeResult<()> {
    if valid_name(name) {
        Ok(())
    } else {
        Err(TreeError::Provider(format!("invalid display name {name:?}")))
    }
}

impl DiskNode {
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    fn child(&self, name: &str) -> DiskNode {
        let mut address = self.address.clone();
        address.segments.push(name.to_string());
        DiskNode {
            address,
            host_path: self.host_path.join(name),
            tree_root: self.tree_root.clone(),
        }
    }

    /// Resolve symlinks and make sure the node still lies inside its tree.
    fn confined(&self) -> TreeResult<PathBuf> {
        let real = dunce::canonicalize(&self.host_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TreeError::NodeNotFound(self.uri()),
            _ => e.into(),
        })?;
        if !real.starts_with(&self.tree_root) {
            warn!(node = %self.uri(), target = %real.display(), "node escapes its tree");
            return Err(TreeError::NotAuthorized(format!("{} leaves the granted tree", self.uri())));
        }
        Ok(real)
    }

    fn free_name(&self, name: &str) -> String {
        if !self.host_path.join(name).exists() {
            return name.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{name} ({n})");
            if !self.host_path.join(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }

    fn check_directory(&self) -> TreeResult<()> {
        if self.confined()?.is_dir() {
            Ok(())
        } else {
            Err(TreeError::NotADirectory(self.uri()))
        }
    }
}

impl DocumentNode for DiskNode {
    fn name(&self) -> Option<String> {
        self.address
            .segments
            .last()
            .cloned()
            .or_else(|| Some(self.address.volume.clone()))
    }

    fn uri(&self) -> String {
        self.address.to_uri()
    }

    fn kind(&self) -> NodeKind {
        if self.host_path.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }

    fn can_write(&self) -> bool {
        fs::metadata(&self.host_path)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
    }

    fn list_children(&self) -> TreeResult<Vec<Self>> {
        self.check_directory()?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.host_path)? {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => debug!(name = ?raw, "skipping non utf-8 entry"),
            }
        }
        names.sort();
        Ok(names.iter().map(|n| self.child(n)).collect())
    }

    fn create_file(&self, _mime_type: &str, name: &str) -> TreeResult<Self> {
        check_name(name)?;
        self.check_directory()?;
        let child = self.child(&self.free_name(name));
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&child.host_path)?;
        Ok(child)
    }

    fn create_directory(&self, name: &str) -> TreeResult<Self> {
        check_name(name)?;
        self.check_directory()?;
        let child = self.child(&self.free_name(name));
        fs::create_dir(&child.host_path)?;
        Ok(child)
    }

    fn delete(&self) -> TreeResult<()> {
        self.confined()?;
        let result = if self.host_path.is_dir() {
            fs::remove_dir_all(&self.host_path)
        } else {
            fs::remove_file(&self.host_path)
        };
        result.map_err(|e| match e.kind() {
            ErrorKind::NotFound => TreeError::NodeNotFound(self.uri()),
            _ => e.into(),
        })
    }

    fn rename(&mut self, new_name: &str) -> TreeResult<()> {
        check_name(new_name)?;
        if self.address.segments.is_empty() {
            return Err(TreeError::Provider("a volume root cannot be renamed".into()));
        }
        self.confined()?;
        let target = self.host_path.with_file_name(new_name);
        if target.exists() {
            return Err(TreeError::Provider(format!("{new_name} already exists")));
        }
        fs::rename(&self.host_path, &target)?;
        self.host_path = target;
        if let Some(last) = self.address.segments.last_mut() {
            *last = new_name.to_string();
        }
        Ok(())
    }

    fn open_read(&self) -> TreeResult<Box<dyn Read>> {
        Ok(Box::new(File::open(self.confined()?)?))
    }

    fn open_write(&self) -> TreeResult<Box<dyn Write>> {
        Ok(Box::new(File::create(self.confined()?)?))
    }
}

#[derive(Debug)]
pub struct DiskProvider {
    host_root: PathBuf,
    storage: StorageRoot,
    api_level: u32,
    grants_file: PathBuf,
}

impl DiskProvider {
    pub fn new(host_root: &Path, storage: StorageRoot, api_level: u32, grants_file: PathBuf) -> TreeResult<Self> {
        let host_root = dunce::canonicalize(host_root)?;
        Ok(Self {
            host_root,
            storage,
            api_level,
            grants_file,
        })
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    fn volume_dir(&self, volume: &str) -> PathBuf {
        if volume == PRIMARY_VOLUME {
            self.host_root.join(self.storage.primary_dir())
        } else {
            self.host_root.join(volume)
        }
    }

    fn load_grants(&self) -> TreeResult<Vec<UriPermission>> {
        match fs::read_to_string(&self.grants_file) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| TreeError::Provider(format!("corrupt grants file: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store_grants(&self, grants: &[UriPermission]) -> TreeResult<()> {
        let raw = serde_json::to_string_pretty(grants)
            .map_err(|e| TreeError::Provider(format!("cannot encode grants: {e}")))?;
        fs::write(&self.grants_file, raw)?;
        Ok(())
    }
}

impl DocumentProvider for DiskProvider {
    type Node = DiskNode;

    fn api_level(&self) -> u32 {
        self.api_level
    }

    fn tree_root(&self, tree_uri: &str) -> TreeResult<Option<DiskNode>> {
        let address = DocumentAddress::parse(tree_uri)?;
        if !valid_name(&address.volume) || !address.segments.iter().all(|s| valid_name(s)) {
            return Err(TreeError::InvalidUri(tree_uri.to_string()));
        }
        let mut host_path = self.volume_dir(&address.volume);
        host_path.extend(&address.segments);
        if !host_path.is_dir() {
            return Ok(None);
        }
        let tree_root = dunce::canonicalize(&host_path)?;
        if !tree_root.starts_with(&self.host_root) {
            warn!(uri = %tree_uri, target = %tree_root.display(), "tree root escapes the host root");
            return Err(TreeError::NotAuthorized(format!("{tree_uri} leaves the host root")));
        }
        Ok(Some(DiskNode {
            address,
            host_path: tree_root.clone(),
            tree_root,
        }))
    }

    // A host process has nobody to ask: the requested tree is granted as is.
    fn launch_tree_picker(&mut self, request: &GrantRequest) -> TreeResult<PickerLaunch> {
        Ok(PickerLaunch::Completed(GrantOutcome::Granted {
            uri: request.initial_uri.clone(),
            access: request.access,
        }))
    }

    fn take_persistable_permission(&mut self, uri: &str, access: UriAccess) -> TreeResult<()> {
        let mut grants = self.load_grants()?;
        grants.retain(|p| p.uri != uri);
        grants.push(UriPermission {
            uri: uri.to_string(),
            access,
        });
        self.store_grants(&grants)
    }

    fn persisted_permissions(&self) -> Vec<UriPermission> {
        self.load_grants().unwrap_or_else(|e| {
            warn!(file = %self.grants_file.display(), error = %e, "cannot read persisted grants");
            Vec::new()
        })
    }

    fn has_all_files_access(&self) -> bool {
        true
    }

    fn request_all_files_access(&mut self) -> TreeResult<()> {
        Ok(())
    }
}
