//! Descriptor-table helper shared by every remote-backed namespace.
//!
//! A [`RemoteNode`] knows where an object lives and how to reach the
//! collaborator, nothing more. Property and command tables are fetched on
//! every call, so values shown are always current.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{EvalErrorKind, RemoteError, ShellError};
use crate::output::{Output, ResultSet};
use crate::remote::{
    ChildEntry, Collaborator, CommandArgs, CommandDescriptor, NodePath, PropertyDescriptor,
};
use crate::value::Value;

#[derive(Clone)]
pub struct RemoteNode {
    path: NodePath,
    collaborator: Arc<dyn Collaborator>,
    timeout: Duration,
}

impl std::fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteNode")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteNode {
    pub fn new(path: NodePath, collaborator: Arc<dyn Collaborator>, timeout: Duration) -> Self {
        Self {
            path,
            collaborator,
            timeout,
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// A node at `path` reached through the same collaborator.
    pub fn relocate(&self, path: NodePath) -> Self {
        Self {
            path,
            collaborator: Arc::clone(&self.collaborator),
            timeout: self.timeout,
        }
    }

    pub fn child(&self, name: &str) -> Self {
        self.relocate(self.path.child(name))
    }

    async fn call<T, F>(&self, operation: &str, fut: F) -> Result<T, ShellError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        debug!(path = %self.path, operation, "collaborator call");
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(path = %self.path, operation, error = %e, "collaborator call failed");
                Err(ShellError::Remote(e))
            }
            Err(_) => {
                let millis = self.timeout.as_millis() as u64;
                warn!(path = %self.path, operation, millis, "collaborator call timed out");
                Err(ShellError::Remote(RemoteError::timeout(operation, millis)))
            }
        }
    }

    pub async fn list_children(&self) -> Result<Vec<ChildEntry>, ShellError> {
        self.call("list_children", self.collaborator.list_children(&self.path))
            .await
    }

    pub async fn list_commands(&self) -> Result<Vec<CommandDescriptor>, ShellError> {
        self.call("list_commands", self.collaborator.list_commands(&self.path))
            .await
    }

    pub async fn list_properties(&self) -> Result<Vec<PropertyDescriptor>, ShellError> {
        self.call("list_properties", self.collaborator.list_properties(&self.path))
            .await
    }

    pub async fn get(&self, name: &str) -> Result<Value, ShellError> {
        self.call("get", self.collaborator.get(&self.path, name)).await
    }

    /// Look up one property descriptor; unknown names are `NotFound`.
    pub async fn property(&self, name: &str) -> Result<PropertyDescriptor, ShellError> {
        self.list_properties()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ShellError::not_found(name))
    }

    /// Validate every assignment against the property table, then write them
    /// in order. Nothing is written unless all of them validate.
    pub async fn set_many(&self, assignments: Vec<(String, Value)>) -> Result<(), ShellError> {
        let table = self.list_properties().await?;
        let mut validated = Vec::with_capacity(assignments.len());
        for (name, value) in assignments {
            let descriptor = table
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| ShellError::not_found(name.as_str()))?;
            let value = descriptor.validate(value).map_err(|e| {
                warn!(path = %self.path, property = %name, error = %e, "rejected property write");
                e
            })?;
            validated.push((name, value));
        }
        for (name, value) in validated {
            self.call("set", self.collaborator.set(&self.path, &name, value))
                .await?;
        }
        Ok(())
    }

    /// Invoke a remote command after binding `args` to its schema.
    pub async fn invoke(
        &self,
        descriptor: &CommandDescriptor,
        args: CommandArgs,
    ) -> Result<Output, ShellError> {
        let args = descriptor.args.bind(&descriptor.name, args)?;
        self.call(
            "invoke",
            self.collaborator.invoke(&self.path, &descriptor.name, args),
        )
        .await
    }

    /// `property | description | value | editable` table of this object.
    pub async fn property_table(&self) -> Result<ResultSet, ShellError> {
        let mut table = ResultSet::with_columns(&["property", "description", "value", "editable"]);
        for descriptor in self.list_properties().await? {
            let value = self.get(&descriptor.name).await?;
            table.push_row(vec![
                Value::String(descriptor.name.clone()),
                Value::String(descriptor.description.clone()),
                value,
                Value::Bool(!descriptor.is_read_only()),
            ]);
        }
        Ok(table)
    }
}

/// Undefined-command error for `name` at `path`.
pub fn undefined_command(path: &NodePath, name: &str) -> ShellError {
    ShellError::eval(
        EvalErrorKind::UndefinedCommand,
        format!("no command '{}' in {}", name, path),
    )
}
