use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::ast::FunctionDef;
use crate::value::Value;

type Scope = HashMap<String, Value>;

/// Variable bindings as a stack of scopes. The bottom scope lives for the
/// whole session; loops push child scopes.
///
/// User functions live in one flat table beside the scopes and are visible
/// everywhere once defined.
#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
    functions: HashMap<String, Arc<FunctionDef>>,
}

/// Scopes set aside while a function body runs.
#[derive(Debug)]
pub struct Frame(Vec<Scope>);

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            functions: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }

    /// Update the nearest existing binding, or create one in the innermost
    /// scope.
    pub fn assign(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.get_mut(name) {
            *slot = value;
        } else {
            self.define(name, value);
        }
    }

    /// Bind in the innermost scope, shadowing outer bindings.
    pub fn define(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// Remove the nearest binding of `name`.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.remove(name))
    }

    pub fn function(&self, name: &str) -> Option<Arc<FunctionDef>> {
        self.functions.get(name).cloned()
    }

    /// Define or replace a user function.
    pub fn define_function(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.clone(), Arc::new(def));
    }

    pub fn remove_function(&mut self, name: &str) -> Option<Arc<FunctionDef>> {
        self.functions.remove(name)
    }

    /// Start a function call: everything above the session scope is set
    /// aside and `params` are bound in a fresh scope. Pass the returned
    /// frame to [`Environment::leave_call`] once the body finishes.
    pub fn enter_call(&mut self, params: impl IntoIterator<Item = (String, Value)>) -> Frame {
        let saved = self.scopes.split_off(1);
        self.scopes.push(params.into_iter().collect());
        Frame(saved)
    }

    pub fn leave_call(&mut self, frame: Frame) {
        self.scopes.truncate(1);
        self.scopes.extend(frame.0);
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Drop the innermost scope. The session scope is never dropped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Drop scopes until only `depth` remain.
    pub fn truncate(&mut self, depth: usize) {
        self.scopes.truncate(depth.max(1));
    }

    /// Visible bindings, innermost winning, sorted by name.
    pub fn visible(&self) -> BTreeMap<&str, &Value> {
        let mut out = BTreeMap::new();
        for scope in &self.scopes {
            for (name, value) in scope {
                out.insert(name.as_str(), value);
            }
        }
        out
    }
}
