//! In-memory document provider.
//!
//! Behaves like the external-storage provider as far as the resolver can
//! tell: volumes keyed by id (`primary`, `6238-3332`, ...), nodes addressed by
//! `tree/<tree id>/document/<volume>%3A<path>` URIs, duplicate names
//! suffixed with ` (n)`. Every mutation is recorded as a [`TreeEvent`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use crate::codec::{DocumentAddress, PRIMARY_VOLUME};
use crate::errors::{TreeError, TreeResult};
use crate::grant::{GrantOutcome, GrantRequest};
use crate::node::{DocumentNode, DocumentProvider, NodeKind, PickerLaunch, UriAccess, UriPermission};

type EntryId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    Created { kind: NodeKind, path: String },
    Deleted { path: String },
    Renamed { from: String, to: String },
}

#[derive(Debug)]
struct Entry {
    name: String,
    kind: NodeKind,
    parent: Option<EntryId>,
    children: Vec<EntryId>,
    data: Vec<u8>,
    removed: bool,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<EntryId, Entry>,
    volumes: BTreeMap<String, EntryId>,
    next_id: EntryId,
    read_only: bool,
    events: Vec<TreeEvent>,
}

impl State {
    fn entry(&self, id: EntryId) -> TreeResult<&Entry> {
        self.entries
            .get(&id)
            .filter(|e| !e.removed)
            .ok_or_else(|| TreeError::NodeNotFound(format!("document {id} is gone")))
    }

    fn entry_mut(&mut self, id: EntryId) -> TreeResult<&mut Entry> {
        self.entries
            .get_mut(&id)
            .filter(|e| !e.removed)
            .ok_or_else(|| TreeError::NodeNotFound(format!("document {id} is gone")))
    }

    fn alloc(&mut self, entry: Entry) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, entry);
        id
    }

    fn add_volume(&mut self, volume: &str) -> EntryId {
        if let Some(id) = self.volumes.get(volume) {
            return *id;
        }
        let id = self.alloc(Entry {
            name: volume.to_string(),
            kind: NodeKind::Directory,
            parent: None,
            children: Vec::new(),
            data: Vec::new(),
            removed: false,
        });
        self.volumes.insert(volume.to_string(), id);
        id
    }

    fn live_children(&self, id: EntryId) -> TreeResult<Vec<EntryId>> {
        Ok(self
            .entry(id)?
            .children
            .iter()
            .copied()
            .filter(|c| self.entries.get(c).is_some_and(|e| !e.removed))
            .collect())
    }

    fn child_named(&self, id: EntryId, name: &str) -> TreeResult<Option<EntryId>> {
        Ok(self
            .live_children(id)?
            .into_iter()
            .find(|c| self.entries.get(c).is_some_and(|e| e.name == name)))
    }

    fn unique_name(&self, parent: EntryId, name: &str) -> TreeResult<String> {
        if self.child_named(parent, name)?.is_none() {
            return Ok(name.to_string());
        }
        let mut n = 1;
        loop {
            let candidate = format!("{name} ({n})");
            if self.child_named(parent, &candidate)?.is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    fn insert(&mut self, parent: EntryId, name: &str, kind: NodeKind) -> TreeResult<EntryId> {
        if self.entry(parent)?.kind != NodeKind::Directory {
            return Err(TreeError::NotADirectory(self.display_path(parent)));
        }
        let name = self.unique_name(parent, name)?;
        let id = self.alloc(Entry {
            name,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            data: Vec::new(),
            removed: false,
        });
        self.entry_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// `volume` and the volume-relative components of `id`.
    fn location(&self, id: EntryId) -> (String, Vec<String>) {
        let mut parts = Vec::new();
        let mut current = id;
        while let Some(entry) = self.entries.get(&current) {
            match entry.parent {
                Some(parent) => {
                    parts.push(entry.name.clone());
                    current = parent;
                }
                None => {
                    parts.reverse();
                    return (entry.name.clone(), parts);
                }
            }
        }
        (String::new(), parts)
    }

    /// `volume:a/b/c`, used in events and messages.
    fn display_path(&self, id: EntryId) -> String {
        let (volume, parts) = self.location(id);
        format!("{volume}:{}", parts.join("/"))
    }

    fn remove(&mut self, id: EntryId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(entry) = self.entries.get_mut(&current) {
                entry.removed = true;
                stack.extend(entry.children.iter().copied());
            }
        }
    }

    fn check_writable(&self, id: EntryId) -> TreeResult<()> {
        self.entry(id)?;
        if self.read_only {
            return Err(TreeError::NotWritable(self.display_path(id)));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryNode {
    state: Rc<RefCell<State>>,
    id: EntryId,
    tree_id: String,
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNode")
            .field("id", &self.id)
            .field("tree_id", &self.tree_id)
            .finish()
    }
}

impl MemoryNode {
    fn child(&self, id: EntryId) -> MemoryNode {
        MemoryNode {
            state: Rc::clone(&self.state),
            id,
            tree_id: self.tree_id.clone(),
        }
    }

    fn create(&self, name: &str, kind: NodeKind) -> TreeResult<MemoryNode> {
        let mut state = self.state.borrow_mut();
        state.check_writable(self.id)?;
        let id = state.insert(self.id, name, kind)?;
        let path = state.display_path(id);
        state.events.push(TreeEvent::Created { kind, path });
        Ok(self.child(id))
    }

    /// Volume-qualified path of the node, e.g. `primary:Download/a.txt`.
    pub fn display_path(&self) -> String {
        self.state.borrow().display_path(self.id)
    }
}

impl DocumentNode for MemoryNode {
    fn name(&self) -> Option<String> {
        self.state.borrow().entry(self.id).ok().map(|e| e.name.clone())
    }

    fn uri(&self) -> String {
        let (volume, segments) = self.state.borrow().location(self.id);
        DocumentAddress {
            tree_id: self.tree_id.clone(),
            volume,
            segments,
        }
        .to_uri()
    }

    fn kind(&self) -> NodeKind {
        self.state
            .borrow()
            .entries
            .get(&self.id)
            .map(|e| e.kind)
            .unwrap_or(NodeKind::File)
    }

    fn can_write(&self) -> bool {
        self.state.borrow().check_writable(self.id).is_ok()
    }

    fn list_children(&self) -> TreeResult<Vec<Self>> {
        let children = self.state.borrow().live_children(self.id)?;
        Ok(children.into_iter().map(|id| self.child(id)).collect())
    }

    fn create_file(&self, _mime_type: &str, name: &str) -> TreeResult<Self> {
        self.create(name, NodeKind::File)
    }

    fn create_directory(&self, name: &str) -> TreeResult<Self> {
        self.create(name, NodeKind::Directory)
    }

    fn delete(&self) -> TreeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_writable(self.id)?;
        let path = state.display_path(self.id);
        let parent = state.entry(self.id)?.parent;
        if let Some(parent) = parent {
            state.entry_mut(parent)?.children.retain(|c| *c != self.id);
        } else {
            state.volumes.retain(|_, root| *root != self.id);
        }
        state.remove(self.id);
        state.events.push(TreeEvent::Deleted { path });
        Ok(())
    }

    fn rename(&mut self, new_name: &str) -> TreeResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_writable(self.id)?;
        let parent = state
            .entry(self.id)?
            .parent
            .ok_or_else(|| TreeError::Provider("a volume root cannot be renamed".into()))?;
        if state.child_named(parent, new_name)?.is_some() {
            return Err(TreeError::Provider(format!("{new_name} already exists")));
        }
        let from = state.display_path(self.id);
        state.entry_mut(self.id)?.name = new_name.to_string();
        let to = state.display_path(self.id);
        state.events.push(TreeEvent::Renamed { from, to });
        Ok(())
    }

    fn open_read(&self) -> TreeResult<Box<dyn Read>> {
        let state = self.state.borrow();
        let entry = state.entry(self.id)?;
        if entry.kind != NodeKind::File {
            return Err(TreeError::Provider(format!(
                "{} is a directory",
                state.display_path(self.id)
            )));
        }
        Ok(Box::new(Cursor::new(entry.data.clone())))
    }

    fn open_write(&self) -> TreeResult<Box<dyn Write>> {
        let state = self.state.borrow();
        state.check_writable(self.id)?;
        if state.entry(self.id)?.kind != NodeKind::File {
            return Err(TreeError::Provider(format!(
                "{} is a directory",
                state.display_path(self.id)
            )));
        }
        Ok(Box::new(MemoryWriter {
            state: Rc::clone(&self.state),
            id: self.id,
            buffer: Vec::new(),
        }))
    }
}

/// Buffers writes and replaces the file content on flush and on drop.
struct MemoryWriter {
    state: Rc<RefCell<State>>,
    id: EntryId,
    buffer: Vec<u8>,
}

impl MemoryWriter {
    fn commit(&self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .entry_mut(self.id)
            .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))?;
        entry.data = self.buffer.clone();
        Ok(())
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit()
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let _ = self.commit();
    }
}

pub struct MemoryProvider {
    state: Rc<RefCell<State>>,
    api_level: u32,
    permissions: Vec<UriPermission>,
    picker_requests: Vec<GrantRequest>,
    picker_answer: Option<GrantOutcome>,
    picker_failure: Option<String>,
    all_files_access: bool,
    all_files_requests: usize,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// A provider with an empty `primary` volume at API level 30.
    pub fn new() -> Self {
        let mut state = State::default();
        state.add_volume(PRIMARY_VOLUME);
        Self {
            state: Rc::new(RefCell::new(state)),
            api_level: 30,
            permissions: Vec::new(),
            picker_requests: Vec::new(),
            picker_answer: None,
            picker_failure: None,
            all_files_access: false,
            all_files_requests: 0,
        }
    }

    pub fn with_api_level(mut self, api_level: u32) -> Self {
        self.api_level = api_level;
        self
    }

    pub fn add_volume(&self, volume: &str) {
        self.state.borrow_mut().add_volume(volume);
    }

    /// Drop a volume and everything on it.
    pub fn unmount(&self, volume: &str) -> bool {
        let mut state = self.state.borrow_mut();
        match state.volumes.remove(volume) {
            Some(root) => {
                state.remove(root);
                true
            }
            None => false,
        }
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.state.borrow_mut().read_only = read_only;
    }

    /// Create `relative` (slash separated) on `volume` directly, without
    /// recording events. The last component gets `kind`.
    pub fn seed(&self, volume: &str, relative: &str, kind: NodeKind) -> TreeResult<()> {
        let mut state = self.state.borrow_mut();
        let mut current = *state
            .volumes
            .get(volume)
            .ok_or_else(|| TreeError::NotFound(format!("volume {volume}")))?;
        let parts: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        for (i, part) in parts.iter().enumerate() {
            let part_kind = if i + 1 == parts.len() { kind } else { NodeKind::Directory };
            current = match state.child_named(current, part)? {
                Some(id) => id,
                None => state.insert(current, part, part_kind)?,
            };
        }
        Ok(())
    }

    /// Content of the file at `volume`/`relative`, if there is one.
    pub fn read_file(&self, volume: &str, relative: &str) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let mut current = *state.volumes.get(volume)?;
        for part in relative.split('/').filter(|s| !s.is_empty()) {
            current = state.child_named(current, part).ok()??;
        }
        let entry = state.entry(current).ok()?;
        (entry.kind == NodeKind::File).then(|| entry.data.clone())
    }

    pub fn events(&self) -> Vec<TreeEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Answer every following picker launch synchronously with `outcome`.
    pub fn answer_picker_with(&mut self, outcome: GrantOutcome) {
        self.picker_answer = Some(outcome);
    }

    /// Make every following picker launch fail with a provider error.
    pub fn fail_picker_with(&mut self, message: &str) {
        self.picker_failure = Some(message.to_string());
    }

    pub fn picker_requests(&self) -> &[GrantRequest] {
        &self.picker_requests
    }

    pub fn set_all_files_access(&mut self, granted: bool) {
        self.all_files_access = granted;
    }

    pub fn all_files_requests(&self) -> usize {
        self.all_files_requests
    }
}

impl DocumentProvider for MemoryProvider {
    type Node = MemoryNode;

    fn api_level(&self) -> u32 {
        self.api_level
    }

    fn tree_root(&self, tree_uri: &str) -> TreeResult<Option<MemoryNode>> {
        let address = DocumentAddress::parse(tree_uri)?;
        let state = self.state.borrow();
        let Some(mut current) = state.volumes.get(&address.volume).copied() else {
            return Ok(None);
        };
        for part in &address.segments {
            match state.child_named(current, part)? {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        if state.entry(current)?.kind != NodeKind::Directory {
            return Ok(None);
        }
        Ok(Some(MemoryNode {
            state: Rc::clone(&self.state),
            id: current,
            tree_id: address.tree_id,
        }))
    }

    fn launch_tree_picker(&mut self, request: &GrantRequest) -> TreeResult<PickerLaunch> {
        self.picker_requests.push(request.clone());
        if let Some(message) = &self.picker_failure {
            return Err(TreeError::Provider(message.clone()));
        }
        Ok(match &self.picker_answer {
            Some(outcome) => PickerLaunch::Completed(outcome.clone()),
            None => PickerLaunch::Pending,
        })
    }

    fn take_persistable_permission(&mut self, uri: &str, access: UriAccess) -> TreeResult<()> {
        self.permissions.retain(|p| p.uri != uri);
        self.permissions.push(UriPermission {
            uri: uri.to_string(),
            access,
        });
        Ok(())
    }

    fn persisted_permissions(&self) -> Vec<UriPermission> {
        self.permissions.clone()
    }

    fn has_all_files_access(&self) -> bool {
        self.all_files_access
    }

    fn request_all_files_access(&mut self) -> TreeResult<()> {
        self.all_files_requests += 1;
        Ok(())
    }
}
