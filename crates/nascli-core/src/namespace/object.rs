//! Namespaces backed by a single remote object.

use async_trait::async_trait;

use crate::error::ShellError;
use crate::output::Output;
use crate::remote::{ArgSchema, ArgSpec, CommandArgs, CommandDescriptor};
use crate::value::{Value, ValueType};

use super::{node, Namespace, NamespaceKind, NamespaceRef, RemoteNode};

/// `show`, `get` and `set`, shared by config objects and collection items.
pub(crate) fn property_commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new("show", "Show all properties", ArgSchema::default()),
        CommandDescriptor::new(
            "get",
            "Print the value of one property",
            ArgSchema {
                positional: vec![ArgSpec::new("property", ValueType::String, true)],
                ..ArgSchema::default()
            },
        ),
        CommandDescriptor::new(
            "set",
            "Change properties: set name=value ...",
            ArgSchema {
                open: true,
                ..ArgSchema::default()
            },
        ),
    ]
}

async fn run_property_command(
    ns: &(impl Namespace + ?Sized),
    name: &str,
    args: CommandArgs,
) -> Result<Output, ShellError> {
    match name {
        "show" => Ok(Output::Table(ns.node().property_table().await?)),
        "get" => {
            let property = match args.positional.first().or_else(|| args.get_named("property")) {
                Some(Value::String(p)) => p.clone(),
                _ => return Err(ShellError::arity("get requires a property name")),
            };
            Ok(Output::Value(ns.get_property(&property).await?))
        }
        "set" => {
            if args.named.is_empty() {
                return Err(ShellError::arity("set requires at least one name=value pair"));
            }
            ns.node().set_many(args.named).await?;
            Ok(Output::None)
        }
        _ => Err(node::undefined_command(ns.path(), name)),
    }
}

/// A single editable object such as global network settings.
#[derive(Debug)]
pub struct ConfigNamespace {
    name: String,
    node: RemoteNode,
    parent: NamespaceRef,
}

impl ConfigNamespace {
    pub fn new(name: String, node: RemoteNode, parent: NamespaceRef) -> Self {
        Self { name, node, parent }
    }
}

#[async_trait]
impl Namespace for ConfigNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NamespaceKind {
        NamespaceKind::Config
    }

    fn parent(&self) -> Option<NamespaceRef> {
        Some(self.parent.clone())
    }

    fn node(&self) -> &RemoteNode {
        &self.node
    }

    fn local_commands(&self) -> Vec<CommandDescriptor> {
        property_commands()
    }

    async fn run_local(&self, name: &str, args: CommandArgs) -> Result<Output, ShellError> {
        run_property_command(self, name, args).await
    }
}

/// One item of a collection, e.g. a single volume.
#[derive(Debug)]
pub struct EntityNamespace {
    name: String,
    node: RemoteNode,
    parent: NamespaceRef,
}

impl EntityNamespace {
    pub fn new(name: String, node: RemoteNode, parent: NamespaceRef) -> Self {
        Self { name, node, parent }
    }
}

#[async_trait]
impl Namespace for EntityNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NamespaceKind {
        NamespaceKind::Entity
    }

    fn parent(&self) -> Option<NamespaceRef> {
        Some(self.parent.clone())
    }

    fn node(&self) -> &RemoteNode {
        &self.node
    }

    fn local_commands(&self) -> Vec<CommandDescriptor> {
        property_commands()
    }

    async fn run_local(&self, name: &str, args: CommandArgs) -> Result<Output, ShellError> {
        run_property_command(self, name, args).await
    }
}
