//! Path resolution and navigation history.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::ast::PathSegment;
use crate::error::ShellError;

use super::{find_child, NamespaceRef};

/// Current namespace plus a bounded stack of previously visited ones.
#[derive(Debug, Clone)]
pub struct Navigator {
    current: NamespaceRef,
    history: VecDeque<NamespaceRef>,
    depth: usize,
}

impl Navigator {
    pub fn new(root: NamespaceRef, depth: usize) -> Self {
        Self {
            current: root,
            history: VecDeque::new(),
            depth: depth.max(1),
        }
    }

    pub fn current(&self) -> &NamespaceRef {
        &self.current
    }

    /// Most recently visited namespace, the target of `-`.
    pub fn previous(&self) -> Option<&NamespaceRef> {
        self.history.back()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Make `target` current. When the path went through `-`, the entry it
    /// consumed is popped first so `-` twice returns to the start.
    pub fn enter(&mut self, target: NamespaceRef, used_previous: bool) {
        if used_previous {
            self.history.pop_back();
        }
        if target.path() == self.current.path() {
            return;
        }
        let left = std::mem::replace(&mut self.current, target);
        self.history.push_back(left);
        while self.history.len() > self.depth {
            self.history.pop_front();
        }
        debug!(path = %self.current.path(), history = self.history.len(), "entered namespace");
    }

    /// Resolve `path` relative to the current namespace.
    pub async fn resolve(
        &self,
        root: &NamespaceRef,
        path: &[PathSegment],
    ) -> Result<NamespaceRef, ShellError> {
        resolve(root, &self.current, self.previous(), path).await
    }
}

/// Apply one segment. `Ok(None)` means a name that is not a child, which a
/// caller may still interpret as a command.
pub async fn step(
    root: &NamespaceRef,
    node: &NamespaceRef,
    previous: Option<&NamespaceRef>,
    segment: &PathSegment,
) -> Result<Option<NamespaceRef>, ShellError> {
    match segment {
        PathSegment::Root => Ok(Some(Arc::clone(root))),
        PathSegment::Parent => Ok(Some(node.parent().unwrap_or_else(|| Arc::clone(node)))),
        PathSegment::Previous => previous
            .cloned()
            .map(Some)
            .ok_or_else(|| ShellError::not_found("-")),
        PathSegment::Name(name) => find_child(node, name).await,
    }
}

/// Resolve `path` from `current`, strictly left to right.
///
/// Fails with `NotFound` naming the first segment that does not match a
/// child. There is no backtracking: the first match for a name is final.
pub async fn resolve(
    root: &NamespaceRef,
    current: &NamespaceRef,
    previous: Option<&NamespaceRef>,
    path: &[PathSegment],
) -> Result<NamespaceRef, ShellError> {
    let mut node = Arc::clone(current);
    for segment in path {
        node = step(root, &node, previous, segment)
            .await?
            .ok_or_else(|| ShellError::not_found(segment.as_word()))?;
    }
    Ok(node)
}
