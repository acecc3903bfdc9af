//! In-process collaborator backed by a JSON object tree.
//!
//! Used for offline sessions against a fixture file and as the backend of
//! tests. The fixture format mirrors the descriptors the shell consumes:
//!
//! ```json
//! {
//!   "children": [
//!     {
//!       "name": "volume",
//!       "kind": "collection",
//!       "properties": [{"name": "name", "type": "string"}],
//!       "commands": [{"name": "create", "action": "create",
//!                     "args": {"named": [{"name": "name", "required": true}], "open": true}}],
//!       "item_commands": [{"name": "delete", "action": "delete"}],
//!       "children": [{"name": "tank", "kind": "entity", "values": {"name": "tank"}}]
//!     }
//!   ]
//! }
//! ```
//!
//! Items of a collection that declare no properties or commands of their own
//! inherit the collection's `properties` and `item_commands`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{RemoteError, ShellError};
use crate::output::Output;
use crate::remote::{
    ArgSchema, ChildEntry, ChildKind, Collaborator, CommandArgs, CommandDescriptor, NodePath,
    PropertyDescriptor, RemoteEvent,
};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MemoryNode {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: ChildKind,
    /// Object properties, or for a collection the schema of its items.
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub commands: Vec<MemoryCommand>,
    /// Commands given to items created in (or declared under) a collection.
    #[serde(default)]
    pub item_commands: Vec<MemoryCommand>,
    #[serde(default)]
    pub children: Vec<MemoryNode>,
}

impl MemoryNode {
    fn child(&self, name: &str) -> Option<&MemoryNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut MemoryNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Copy collection schema and item commands into items lacking their own.
    fn normalize(&mut self) {
        if self.kind == ChildKind::Collection {
            for item in self.children.iter_mut() {
                if item.properties.is_empty() {
                    item.properties = self.properties.clone();
                }
                if item.commands.is_empty() {
                    item.commands = self.item_commands.clone();
                }
                item.values
                    .entry("name".to_string())
                    .or_insert_with(|| Value::String(item.name.clone()));
            }
        }
        for child in self.children.iter_mut() {
            child.normalize();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCommand {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args: ArgSchema,
    pub action: CommandAction,
}

impl MemoryCommand {
    fn descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new(&self.name, &self.description, self.args.clone())
    }
}

/// What a fixture command does when invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    /// Add an item to this collection from the named arguments.
    Create,
    /// Remove this item from its collection.
    Delete,
    /// Start a background job and return its handle.
    Job,
    /// Return a fixed value.
    Return(Value),
}

pub struct MemoryCollaborator {
    root: RwLock<MemoryNode>,
    events: broadcast::Sender<RemoteEvent>,
    next_job: AtomicU64,
}

fn not_found(path: &NodePath) -> RemoteError {
    RemoteError::new("ENOENT", format!("{} does not exist", path))
}

fn poisoned() -> RemoteError {
    RemoteError::new("EIO", "backend state is unavailable")
}

impl MemoryCollaborator {
    pub fn new(mut root: MemoryNode) -> Self {
        root.normalize();
        let (events, _) = broadcast::channel(64);
        Self {
            root: RwLock::new(root),
            events,
            next_job: AtomicU64::new(1),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    /// Load a fixture file.
    pub fn load(path: &Path) -> Result<Self, ShellError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ShellError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| ShellError::Io(format!("{}: invalid fixture: {}", path.display(), e)))
    }

    fn read<R>(&self, path: &NodePath, f: impl FnOnce(&MemoryNode) -> R) -> Result<R, RemoteError> {
        let root = self.root.read().map_err(|_| poisoned())?;
        let mut node = &*root;
        for segment in path.segments() {
            node = node.child(segment).ok_or_else(|| not_found(path))?;
        }
        Ok(f(node))
    }

    fn write<R>(
        &self,
        path: &NodePath,
        f: impl FnOnce(&mut MemoryNode) -> Result<R, RemoteError>,
    ) -> Result<R, RemoteError> {
        let mut root = self.root.write().map_err(|_| poisoned())?;
        let mut node = &mut *root;
        for segment in path.segments() {
            node = node.child_mut(segment).ok_or_else(|| not_found(path))?;
        }
        f(node)
    }

    fn notify(&self, event: RemoteEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Delete the node at `path`.
    pub fn remove(&self, path: &NodePath) -> Result<(), RemoteError> {
        let (parent, name) = match (path.parent(), path.name()) {
            (Some(parent), Some(name)) => (parent, name.to_string()),
            _ => return Err(RemoteError::new("EPERM", "cannot remove the root")),
        };
        self.write(&parent, |node| {
            let before = node.children.len();
            node.children.retain(|c| c.name != name);
            if node.children.len() == before {
                return Err(not_found(path));
            }
            Ok(())
        })?;
        debug!(path = %path, "removed node");
        self.notify(RemoteEvent::Removed { path: path.clone() });
        Ok(())
    }

    /// Current value of a property, bypassing the shell. For inspection.
    pub fn value(&self, path: &NodePath, name: &str) -> Option<Value> {
        self.read(path, |node| node.values.get(name).cloned())
            .ok()
            .flatten()
    }

    fn create(&self, path: &NodePath, args: CommandArgs) -> Result<Output, RemoteError> {
        let name = match args.get_named("name").or_else(|| args.positional.first()) {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => return Err(RemoteError::new("EINVAL", "name is required")),
        };
        self.write(path, |collection| {
            if collection.kind != ChildKind::Collection {
                return Err(RemoteError::new("EINVAL", "not a collection"));
            }
            if collection.child(&name).is_some() {
                return Err(RemoteError::new(
                    "EEXIST",
                    format!("{} already exists", name),
                ));
            }
            let mut values = BTreeMap::new();
            for (key, value) in args.named.iter().filter(|(key, _)| key != "name") {
                let descriptor = collection
                    .properties
                    .iter()
                    .find(|p| &p.name == key)
                    .ok_or_else(|| {
                        RemoteError::new("EINVAL", format!("unknown property {}", key))
                    })?;
                let value = descriptor
                    .validate(value.clone())
                    .map_err(|e| RemoteError::new("EINVAL", e.to_string()))?;
                values.insert(key.clone(), value);
            }
            values.insert("name".to_string(), Value::String(name.clone()));
            collection.children.push(MemoryNode {
                name: name.clone(),
                kind: ChildKind::Entity,
                properties: collection.properties.clone(),
                values,
                commands: collection.item_commands.clone(),
                item_commands: Vec::new(),
                children: Vec::new(),
            });
            Ok(())
        })?;
        let item = path.child(&name);
        self.notify(RemoteEvent::Changed { path: path.clone() });
        Ok(Output::Item(item))
    }
}

#[async_trait]
impl Collaborator for MemoryCollaborator {
    async fn list_children(&self, path: &NodePath) -> Result<Vec<ChildEntry>, RemoteError> {
        self.read(path, |node| {
            node.children
                .iter()
                .map(|c| ChildEntry {
                    name: c.name.clone(),
                    kind: c.kind,
                })
                .collect()
        })
    }

    async fn list_commands(
        &self,
        path: &NodePath,
    ) -> Result<Vec<CommandDescriptor>, RemoteError> {
        self.read(path, |node| {
            node.commands.iter().map(MemoryCommand::descriptor).collect()
        })
    }

    async fn list_properties(
        &self,
        path: &NodePath,
    ) -> Result<Vec<PropertyDescriptor>, RemoteError> {
        self.read(path, |node| node.properties.clone())
    }

    async fn get(&self, path: &NodePath, name: &str) -> Result<Value, RemoteError> {
        self.read(path, |node| {
            if !node.properties.iter().any(|p| p.name == name) {
                return Err(RemoteError::new(
                    "ENOENT",
                    format!("{} has no property {}", path, name),
                ));
            }
            Ok(node.values.get(name).cloned().unwrap_or(Value::Null))
        })?
    }

    async fn set(&self, path: &NodePath, name: &str, value: Value) -> Result<(), RemoteError> {
        self.write(path, |node| {
            match node.properties.iter().find(|p| p.name == name) {
                None => {
                    return Err(RemoteError::new(
                        "ENOENT",
                        format!("{} has no property {}", path, name),
                    ))
                }
                Some(p) if p.is_read_only() => {
                    return Err(RemoteError::new("EPERM", format!("{} is read-only", name)))
                }
                Some(_) => {}
            }
            node.values.insert(name.to_string(), value);
            Ok(())
        })?;
        debug!(path = %path, property = name, "property written");
        self.notify(RemoteEvent::Changed { path: path.clone() });
        Ok(())
    }

    async fn invoke(
        &self,
        path: &NodePath,
        name: &str,
        args: CommandArgs,
    ) -> Result<Output, RemoteError> {
        let action = self.read(path, |node| {
            node.commands
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.action.clone())
        })?;
        let action = action.ok_or_else(|| {
            RemoteError::new("ENOENT", format!("{} has no command {}", path, name))
        })?;
        debug!(path = %path, command = name, "invoking fixture command");
        match action {
            CommandAction::Create => self.create(path, args),
            CommandAction::Delete => {
                self.remove(path)?;
                Ok(Output::None)
            }
            CommandAction::Job => {
                let id = self.next_job.fetch_add(1, Ordering::SeqCst);
                Ok(Output::Value(Value::String(format!("job-{}", id))))
            }
            CommandAction::Return(value) => Ok(Output::Value(value)),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<RemoteEvent>> {
        Some(self.events.subscribe())
    }
}
