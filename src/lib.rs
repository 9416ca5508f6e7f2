//! Slash-separated path access to a granted external-storage document tree.
//!
//! [`codec`] maps `/storage/<volume>/...` paths onto tree URIs, [`resolver`]
//! walks (and fills in) the live tree below a granted root, and
//! [`tree::ScopedTree`] puts both behind one path-addressed API. The storage
//! platform itself sits behind the traits in [`node`].

pub mod cli;
pub mod codec;
pub mod config;
pub mod copy;
pub mod disk;
pub mod errors;
pub mod grant;
pub mod logging;
pub mod memory;
pub mod node;
pub mod resolver;
pub mod scope;
pub mod tree;


pub use codec::{normalize, PathCodec, StorageRoot};
pub use errors::{TreeError, TreeResult};
pub use node::{DocumentNode, DocumentProvider, NodeKind};
pub use scope::PermissionScope;
pub use tree::ScopedTree;
