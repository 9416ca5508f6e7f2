//! Command dispatch for the `doctree` binary. Every command answers with one
//! JSON value; failures become an [`ErrorBody`].

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::Engine;
use serde_json::{json, Value};

use crate::config::Config;
use crate::disk::DiskProvider;
use crate::errors::{into_body, ErrorBody, TreeError};
use crate::node::{DocumentNode, DocumentProvider, NodeKind};
use crate::tree::ScopedTree;

pub const USAGE: &str = "usage: doctree [--config PATH] [--dir] [--b64] <command> [operands]
commands:
  uri <path>             tree uri for a storage path
  path <uri>             storage path for a tree uri
  status                 permission scope and access state
  grant                  request and persist access to the permission dir
  grants                 persisted grants
  mkdir <path>           create a directory (and missing parents)
  touch <path>           create a file (and missing parents)
  write <path> <data>    replace file content (--b64: data is base64)
  read <path>            file content as base64
  ls <path>              list a directory
  rm <path>              delete a file (--dir: a directory)
  mv <path> <name>       rename a file (--dir: a directory)
  cp <from> <to>         copy file content inside the tree
  import <host> <path>   copy a host file into the tree
  export <path> <host>   copy a tree file out to the host";

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: PathBuf,
    pub kind: NodeKind,
    pub b64: bool,
    pub help: bool,
    pub command: Option<String>,
    pub operands: Vec<String>,
}

impl Invocation {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Self> {
        let mut inv = Invocation {
            config_path: PathBuf::from("doctree.toml"),
            kind: NodeKind::File,
            b64: false,
            help: false,
            command: None,
            operands: Vec::new(),
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config requires a path")?;
                    inv.config_path = PathBuf::from(path);
                }
                "--dir" => inv.kind = NodeKind::Directory,
                "--b64" => inv.b64 = true,
                "--help" | "-h" => inv.help = true,
                word if inv.command.is_none() => inv.command = Some(word.to_string()),
                word => inv.operands.push(word.to_string()),
            }
        }
        Ok(inv)
    }
}

/// Load and validate the config, then open the host-backed tree it names.
pub fn open(config_path: &Path) -> anyhow::Result<ScopedTree<DiskProvider>> {
    let cfg = Config::load(config_path).context("loading config")?;
    cfg.validate().context("validating config")?;
    let storage = cfg.storage_root()?;
    let provider = DiskProvider::new(
        &cfg.storage.host_root,
        storage.clone(),
        cfg.platform.api_level,
        cfg.grants_path(),
    )
    .context("opening host root")?;
    Ok(ScopedTree::new(provider, storage, &cfg.scope.permission_dir).with_buffer_size(cfg.copy.buffer_size))
}

/// Tree failures keep their own code; anything else is reported as `fallback`.
pub fn error_body(err: &anyhow::Error, fallback: &'static str) -> ErrorBody {
    match err.downcast_ref::<TreeError>() {
        Some(tree_err) => into_body(tree_err),
        None => ErrorBody {
            code: fallback,
            message: format!("{err:#}"),
        },
    }
}

pub fn error_json(body: ErrorBody) -> Value {
    json!({ "error": body })
}

fn operand<'a>(operands: &'a [String], i: usize, command: &str) -> anyhow::Result<&'a str> {
    operands
        .get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("{command} expects {} operand(s)", i + 1))
}

fn describe<N: DocumentNode>(node: &N) -> Value {
    json!({ "name": node.name(), "uri": node.uri(), "kind": node.kind() })
}

fn existing_file<P: DocumentProvider>(tree: &ScopedTree<P>, path: &str) -> Result<P::Node, TreeError> {
    match tree.lookup(path)? {
        Some(node) if node.is_file() => Ok(node),
        _ => Err(TreeError::NodeNotFound(path.to_string())),
    }
}

/// Run one command. `read`, `ls`, `export` and the source of `cp` only look
/// nodes up and never create them.
pub fn run<P: DocumentProvider>(
    tree: &mut ScopedTree<P>,
    command: &str,
    operands: &[String],
    kind: NodeKind,
    b64: bool,
) -> anyhow::Result<Value> {
    let out = match command {
        "uri" => json!({ "uri": tree.path_to_uri(operand(operands, 0, command)?)? }),
        "path" => json!({ "path": tree.uri_to_path(operand(operands, 0, command)?)? }),
        "status" => json!({
            "permission_path": tree.scope().permission_path(),
            "permission_uri": tree.scope().permission_uri().ok(),
            "permitted": tree.is_permitted(),
            "all_files_access": tree.has_all_files_access(),
        }),
        "grant" => {
            let pending = tree.request_permission()?;
            json!({ "granted": tree.save_permission(pending)? })
        }
        "grants" => json!({ "grants": tree.persisted_permissions() }),
        "mkdir" => describe(&tree.create_directory(operand(operands, 0, command)?)?),
        "touch" => describe(&tree.create_file(operand(operands, 0, command)?)?),
        "write" => {
            let path = operand(operands, 0, command)?;
            let data = operand(operands, 1, command)?;
            let bytes = if b64 {
                base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .context("invalid base64")?
            } else {
                data.as_bytes().to_vec()
            };
            let mut out = tree.open_write(path)?;
            out.write_all(&bytes).map_err(TreeError::from)?;
            out.flush().map_err(TreeError::from)?;
            json!({ "bytes_written": bytes.len() })
        }
        "read" => {
            let node = existing_file(&*tree, operand(operands, 0, command)?)?;
            let mut data = Vec::new();
            node.open_read()?.read_to_end(&mut data).map_err(TreeError::from)?;
            let b64 = base64::engine::general_purpose::STANDARD.encode(data);
            json!({ "content_b64": b64, "encoding": "base64" })
        }
        "ls" => {
            let path = operand(operands, 0, command)?;
            let node = tree
                .lookup(path)?
                .ok_or_else(|| TreeError::NodeNotFound(path.to_string()))?;
            let children: Vec<Value> = node.list_children()?.iter().map(describe).collect();
            json!({ "node": describe(&node), "children": children })
        }
        "rm" => {
            let path = operand(operands, 0, command)?;
            tree.delete(path, kind)?;
            json!({ "deleted": path })
        }
        "mv" => {
            let path = operand(operands, 0, command)?;
            describe(&tree.rename(path, kind, operand(operands, 1, command)?)?)
        }
        "cp" => {
            let from = existing_file(&*tree, operand(operands, 0, command)?)?;
            let to = tree.create_file(operand(operands, 1, command)?)?;
            json!({ "bytes_copied": tree.copy_node(&from, &to)? })
        }
        "import" => {
            let host = Path::new(operand(operands, 0, command)?);
            let to = tree.create_file(operand(operands, 1, command)?)?;
            json!({ "bytes_copied": tree.copy_from_file(host, &to)? })
        }
        "export" => {
            let from = existing_file(&*tree, operand(operands, 0, command)?)?;
            let host = Path::new(operand(operands, 1, command)?);
            json!({ "bytes_copied": tree.copy_to_file(&from, host)? })
        }
        other => anyhow::bail!("unknown command {other}"),
    };
    Ok(out)
}
