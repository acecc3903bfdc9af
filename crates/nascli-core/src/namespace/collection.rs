use async_trait::async_trait;
use tracing::debug;

use crate::error::{EvalErrorKind, ShellError};
use crate::output::{Output, ResultSet};
use crate::remote::{ArgSchema, ChildKind, CommandArgs, CommandDescriptor};
use crate::value::Value;

use super::{node, Namespace, NamespaceKind, NamespaceRef, RemoteNode};

/// A set of named items. Its property list is the schema its items share;
/// the collection itself has no property values.
#[derive(Debug)]
pub struct CollectionNamespace {
    name: String,
    node: RemoteNode,
    parent: NamespaceRef,
}

impl CollectionNamespace {
    pub fn new(name: String, node: RemoteNode, parent: NamespaceRef) -> Self {
        Self { name, node, parent }
    }

    /// One row per item: `name`, then every listed schema property.
    async fn item_table(&self) -> Result<ResultSet, ShellError> {
        let schema: Vec<_> = self
            .node
            .list_properties()
            .await?
            .into_iter()
            .filter(|p| p.list && p.name != "name")
            .collect();

        let mut columns = vec!["name".to_string()];
        columns.extend(schema.iter().map(|p| p.name.clone()));
        let mut table = ResultSet::new(columns);

        for entry in self.node.list_children().await? {
            if entry.kind != ChildKind::Entity {
                continue;
            }
            let item = self.node.child(&entry.name);
            let mut row = vec![Value::String(entry.name.clone())];
            for property in &schema {
                row.push(item.get(&property.name).await?);
            }
            table.push_row(row);
        }
        debug!(path = %self.node.path(), rows = table.len(), "listed collection");
        Ok(table)
    }

    fn no_values(&self) -> ShellError {
        ShellError::eval(
            EvalErrorKind::Rejected,
            format!(
                "{} is a collection; enter one of its items to read or change properties",
                self.node.path()
            ),
        )
    }
}

#[async_trait]
impl Namespace for CollectionNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NamespaceKind {
        NamespaceKind::Collection
    }

    fn parent(&self) -> Option<NamespaceRef> {
        Some(self.parent.clone())
    }

    fn node(&self) -> &RemoteNode {
        &self.node
    }

    fn local_commands(&self) -> Vec<CommandDescriptor> {
        vec![CommandDescriptor::new(
            "show",
            "List all items",
            ArgSchema::default(),
        )]
    }

    async fn run_local(&self, name: &str, _args: CommandArgs) -> Result<Output, ShellError> {
        match name {
            "show" => Ok(Output::Table(self.item_table().await?)),
            _ => Err(node::undefined_command(self.node.path(), name)),
        }
    }

    async fn get_property(&self, _name: &str) -> Result<Value, ShellError> {
        Err(self.no_values())
    }

    async fn set_property(&self, _name: &str, _value: Value) -> Result<(), ShellError> {
        Err(self.no_values())
    }
}
