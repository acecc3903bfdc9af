//! The command namespace tree.
//!
//! Every place a user can `cd` into is a [`Namespace`]: the root, a single
//! configuration object, a collection of items, or one item. All four share
//! one capability set (list children, commands and properties; get and set
//! properties; invoke commands) and differ only in which local commands they
//! add and how they present themselves.
//!
//! Nodes are created on demand while resolving a path and hold only their
//! remote location and a strong link to their parent, so the tree has no
//! cycles and a removed remote object simply makes later calls fail.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nascli_core::memory::MemoryCollaborator;
//! use nascli_core::namespace::{find_child, root::RootNamespace, Namespace};
//!
//! # async fn demo() -> Result<(), nascli_core::error::ShellError> {
//! let backend = Arc::new(MemoryCollaborator::from_json(r#"{"children": []}"#).unwrap());
//! let root = RootNamespace::new(backend, Duration::from_secs(5));
//! if let Some(volumes) = find_child(&root, "volume").await? {
//!     println!("{} children", volumes.list_children().await?.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod node;
pub mod object;
pub mod resolve;
pub mod root;
pub mod tree;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ShellError;
use crate::output::Output;
use crate::remote::{ChildEntry, ChildKind, CommandArgs, CommandDescriptor, NodePath, PropertyDescriptor};
use crate::value::Value;

pub use node::RemoteNode;

/// Shared handle to a namespace node.
pub type NamespaceRef = Arc<dyn Namespace>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Root,
    Config,
    Collection,
    Entity,
}

impl From<ChildKind> for NamespaceKind {
    fn from(kind: ChildKind) -> Self {
        match kind {
            ChildKind::Config => NamespaceKind::Config,
            ChildKind::Collection => NamespaceKind::Collection,
            ChildKind::Entity => NamespaceKind::Entity,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NamespaceKind::Root => "root",
            NamespaceKind::Config => "config",
            NamespaceKind::Collection => "collection",
            NamespaceKind::Entity => "entity",
        };
        f.write_str(name)
    }
}

/// A node of the command tree.
///
/// Implementors supply identity, their [`RemoteNode`], and optionally local
/// commands; the listing, property and invocation behavior is provided.
/// Remote commands shadow local commands with the same name.
#[async_trait]
pub trait Namespace: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> NamespaceKind;

    /// Parent node; `None` only for the root.
    fn parent(&self) -> Option<NamespaceRef>;

    fn node(&self) -> &RemoteNode;

    fn path(&self) -> &NodePath {
        self.node().path()
    }

    /// Commands implemented by the shell itself for this kind of node.
    fn local_commands(&self) -> Vec<CommandDescriptor> {
        Vec::new()
    }

    /// Run a command listed by [`local_commands`](Self::local_commands).
    /// Arguments are already bound to its schema.
    async fn run_local(&self, name: &str, _args: CommandArgs) -> Result<Output, ShellError> {
        Err(node::undefined_command(self.path(), name))
    }

    async fn list_children(&self) -> Result<Vec<ChildEntry>, ShellError> {
        self.node().list_children().await
    }

    /// Local commands in declaration order (replaced in place by remote
    /// commands of the same name), followed by the remaining remote commands.
    async fn list_commands(&self) -> Result<Vec<CommandDescriptor>, ShellError> {
        let mut remote = self.node().list_commands().await?;
        let mut commands = Vec::with_capacity(remote.len() + 3);
        for local in self.local_commands() {
            match remote.iter().position(|r| r.name == local.name) {
                Some(idx) => commands.push(remote.remove(idx)),
                None => commands.push(local),
            }
        }
        commands.extend(remote);
        Ok(commands)
    }

    async fn list_properties(&self) -> Result<Vec<PropertyDescriptor>, ShellError> {
        self.node().list_properties().await
    }

    async fn get_property(&self, name: &str) -> Result<Value, ShellError> {
        self.node().property(name).await?;
        self.node().get(name).await
    }

    /// Validate locally, then write. Read-only and ill-typed values are
    /// rejected without any remote write.
    async fn set_property(&self, name: &str, value: Value) -> Result<(), ShellError> {
        self.node().set_many(vec![(name.to_string(), value)]).await
    }

    async fn invoke(&self, name: &str, args: CommandArgs) -> Result<Output, ShellError> {
        let remote = self.node().list_commands().await?;
        if let Some(descriptor) = remote.iter().find(|c| c.name == name) {
            return self.node().invoke(descriptor, args).await;
        }
        match self.local_commands().into_iter().find(|c| c.name == name) {
            Some(descriptor) => {
                let args = descriptor.args.bind(name, args)?;
                self.run_local(name, args).await
            }
            None => Err(node::undefined_command(self.path(), name)),
        }
    }
}

/// Build the node for `entry`, a child of `parent`.
pub fn instantiate(parent: &NamespaceRef, entry: &ChildEntry) -> NamespaceRef {
    let node = parent.node().child(&entry.name);
    match entry.kind {
        ChildKind::Config => Arc::new(object::ConfigNamespace::new(
            entry.name.clone(),
            node,
            Arc::clone(parent),
        )),
        ChildKind::Entity => Arc::new(object::EntityNamespace::new(
            entry.name.clone(),
            node,
            Arc::clone(parent),
        )),
        ChildKind::Collection => Arc::new(collection::CollectionNamespace::new(
            entry.name.clone(),
            node,
            Arc::clone(parent),
        )),
    }
}

/// The child of `parent` called `name`, if there is one.
pub async fn find_child(
    parent: &NamespaceRef,
    name: &str,
) -> Result<Option<NamespaceRef>, ShellError> {
    let children = parent.list_children().await?;
    Ok(children
        .iter()
        .find(|c| c.name == name)
        .map(|entry| instantiate(parent, entry)))
}

/// The command of `ns` called `name`, if there is one.
pub async fn find_command(
    ns: &NamespaceRef,
    name: &str,
) -> Result<Option<CommandDescriptor>, ShellError> {
    Ok(ns.list_commands().await?.into_iter().find(|c| c.name == name))
}
