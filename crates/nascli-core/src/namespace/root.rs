use std::sync::Arc;
use std::time::Duration;

use crate::remote::{Collaborator, NodePath};

use super::{Namespace, NamespaceKind, NamespaceRef, RemoteNode};

/// Top of the tree. Has no local commands; the global builtins apply here as
/// everywhere.
#[derive(Debug)]
pub struct RootNamespace {
    node: RemoteNode,
}

impl RootNamespace {
    pub fn new(collaborator: Arc<dyn Collaborator>, timeout: Duration) -> NamespaceRef {
        Arc::new(Self {
            node: RemoteNode::new(NodePath::root(), collaborator, timeout),
        })
    }
}

impl Namespace for RootNamespace {
    fn name(&self) -> &str {
        "/"
    }

    fn kind(&self) -> NamespaceKind {
        NamespaceKind::Root
    }

    fn parent(&self) -> Option<NamespaceRef> {
        None
    }

    fn node(&self) -> &RemoteNode {
        &self.node
    }
}
