//! Interface to the middleware that owns the real system state.
//!
//! The shell never talks to a wire protocol directly. Everything it knows
//! about pools, shares, accounts and services arrives through a
//! [`Collaborator`], addressed by [`NodePath`]. Implementations may be an RPC
//! client, a test double, or the in-process
//! [`MemoryCollaborator`](crate::memory::MemoryCollaborator).
//!
//! Descriptors returned here are pure data: the shell decides how to display
//! them, validate against them and route commands with them.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{RemoteError, ShellError};
use crate::output::Output;
use crate::value::{Value, ValueType};

/// Location of a node as names from the root. The root itself is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse `/a/b` (leading slash optional).
    pub fn parse(text: &str) -> Self {
        Self::from_segments(text.split('/').filter(|s| !s.is_empty()))
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// What a child node is, which decides how the shell models it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChildKind {
    /// A single editable object (e.g. global network settings).
    #[default]
    Config,
    /// A set of named items (e.g. all volumes).
    Collection,
    /// One item of a collection.
    Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub name: String,
    pub kind: ChildKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    #[default]
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: ValueType,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub description: String,
    /// Shown as a column when the owning collection is listed.
    #[serde(default = "default_true")]
    pub list: bool,
    /// Allowed values; empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Value>,
}

fn default_true() -> bool {
    true
}

impl PropertyDescriptor {
    pub fn new(name: &str, ty: ValueType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            access: Access::ReadWrite,
            description: String::new(),
            list: true,
            choices: Vec::new(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.access == Access::ReadOnly
    }

    /// Coerce `value` to the declared type and check it against `choices`.
    /// Purely local; never touches the collaborator.
    pub fn validate(&self, value: Value) -> Result<Value, ShellError> {
        if self.is_read_only() {
            return Err(ShellError::ReadOnly {
                property: self.name.clone(),
            });
        }
        let value = self.ty.coerce(&self.name, value)?;
        if !self.choices.is_empty() && !self.choices.iter().any(|c| c.loose_eq(&value)) {
            let allowed: Vec<String> = self.choices.iter().map(|c| c.to_string()).collect();
            return Err(ShellError::eval(
                crate::error::EvalErrorKind::Rejected,
                format!(
                    "invalid value '{}' for {}, should be one of: {}",
                    value,
                    self.name,
                    allowed.join(", ")
                ),
            ));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: ValueType,
    #[serde(default)]
    pub required: bool,
}

impl ArgSpec {
    pub fn new(name: &str, ty: ValueType, required: bool) -> Self {
        Self {
            name: name.to_string(),
            ty,
            required,
        }
    }
}

/// Positional and named parameters a command accepts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArgSchema {
    #[serde(default)]
    pub positional: Vec<ArgSpec>,
    #[serde(default)]
    pub named: Vec<ArgSpec>,
    /// Type of extra positional arguments, if any are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<ValueType>,
    /// Accept named arguments not listed in `named`, uncoerced.
    #[serde(default)]
    pub open: bool,
}

impl ArgSchema {
    /// Check arity and coerce every argument to its declared type.
    pub fn bind(&self, command: &str, args: CommandArgs) -> Result<CommandArgs, ShellError> {
        let CommandArgs { positional, named } = args;

        if positional.len() > self.positional.len() && self.rest.is_none() {
            return Err(ShellError::arity(format!(
                "{} takes at most {} positional argument(s), got {}",
                command,
                self.positional.len(),
                positional.len()
            )));
        }

        let given = positional.len();
        let mut bound = CommandArgs::default();
        for (i, value) in positional.into_iter().enumerate() {
            let value = match self.positional.get(i) {
                Some(spec) => spec.ty.coerce(&spec.name, value)?,
                None => self.rest.unwrap_or_default().coerce(command, value)?,
            };
            bound.positional.push(value);
        }

        for (name, value) in named {
            let spec = self
                .named
                .iter()
                .chain(self.positional.iter().skip(given))
                .find(|s| s.name == name);
            let value = match spec {
                Some(spec) => spec.ty.coerce(&spec.name, value)?,
                None if self.open => value,
                None => {
                    return Err(ShellError::arity(format!(
                        "unknown argument '{}' for {}",
                        name, command
                    )))
                }
            };
            bound.named.push((name, value));
        }

        let missing = self
            .positional
            .iter()
            .skip(given)
            .chain(self.named.iter())
            .find(|spec| spec.required && bound.get_named(&spec.name).is_none());
        if let Some(spec) = missing {
            return Err(ShellError::arity(format!(
                "{} requires argument '{}'",
                command, spec.name
            )));
        }

        Ok(bound)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args: ArgSchema,
}

impl CommandDescriptor {
    pub fn new(name: &str, description: &str, args: ArgSchema) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            args,
        }
    }
}

/// Arguments of one command invocation, in the order given.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandArgs {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl CommandArgs {
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.named
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Change notifications pushed by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RemoteEvent {
    Changed { path: NodePath },
    Removed { path: NodePath },
    /// Everything may have changed; rebuild from the root.
    Reset,
}

/// Access to remote objects, addressed by node path.
///
/// All methods may block on the network; the shell bounds each call with a
/// timeout and the current statement's cancellation. Errors are returned
/// verbatim to the user and never retried.
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Children of the node, in declaration order.
    async fn list_children(&self, path: &NodePath) -> Result<Vec<ChildEntry>, RemoteError>;

    /// Commands the node exposes, in declaration order.
    async fn list_commands(&self, path: &NodePath)
        -> Result<Vec<CommandDescriptor>, RemoteError>;

    /// Properties of the node. For a collection this is the schema shared by
    /// its items.
    async fn list_properties(
        &self,
        path: &NodePath,
    ) -> Result<Vec<PropertyDescriptor>, RemoteError>;

    async fn get(&self, path: &NodePath, name: &str) -> Result<Value, RemoteError>;

    async fn set(&self, path: &NodePath, name: &str, value: Value) -> Result<(), RemoteError>;

    /// Run a command. Long operations should return a job handle as a value
    /// rather than block.
    async fn invoke(
        &self,
        path: &NodePath,
        name: &str,
        args: CommandArgs,
    ) -> Result<Output, RemoteError>;

    /// Stream of change notifications, if the collaborator publishes any.
    fn subscribe(&self) -> Option<broadcast::Receiver<RemoteEvent>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ArgSchema {
        ArgSchema {
            positional: vec![ArgSpec::new("name", ValueType::String, true)],
            named: vec![ArgSpec::new("size", ValueType::Integer, false)],
            rest: None,
            open: false,
        }
    }

    #[test]
    fn test_node_path_display_and_parse() {
        assert_eq!(NodePath::root().to_string(), "/");
        let path = NodePath::parse("/storage/volume/");
        assert_eq!(path.segments(), &["storage", "volume"]);
        assert_eq!(path.to_string(), "/storage/volume");
        assert_eq!(path.parent(), Some(NodePath::parse("storage")));
        assert_eq!(path.child("tank").name(), Some("tank"));
    }

    #[test]
    fn test_bind_coerces_arguments() {
        let args = CommandArgs {
            positional: vec![Value::from("tank")],
            named: vec![("size".into(), Value::from("10"))],
        };
        let bound = schema().bind("create", args).unwrap();
        assert_eq!(bound.get_named("size"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_bind_positional_by_name() {
        let args = CommandArgs {
            positional: vec![],
            named: vec![("name".into(), Value::from("tank"))],
        };
        assert!(schema().bind("create", args).is_ok());
    }

    #[test]
    fn test_bind_arity_errors() {
        let too_many = CommandArgs {
            positional: vec![Value::from("a"), Value::from("b")],
            named: vec![],
        };
        let err = schema().bind("create", too_many).unwrap_err();
        assert_eq!(err.kind(), "ArityError");

        let missing = CommandArgs::default();
        let err = schema().bind("create", missing).unwrap_err();
        assert!(err.to_string().contains("requires argument 'name'"));

        let unknown = CommandArgs {
            positional: vec![Value::from("a")],
            named: vec![("colour".into(), Value::from("red"))],
        };
        assert!(schema().bind("create", unknown).is_err());
    }

    #[test]
    fn test_validate_read_only_and_choices() {
        let ro = PropertyDescriptor::new("guid", ValueType::String).read_only();
        assert!(matches!(
            ro.validate(Value::from("x")),
            Err(ShellError::ReadOnly { .. })
        ));

        let mut mode = PropertyDescriptor::new("mode", ValueType::String);
        mode.choices = vec![Value::from("on"), Value::from("off")];
        assert!(mode.validate(Value::from("on")).is_ok());
        assert_eq!(
            mode.validate(Value::from("maybe")).unwrap_err().kind(),
            "ValueError"
        );
    }
}
