//! Tree-walking evaluator.
//!
//! An [`Evaluator`] runs one parsed statement against borrowed session state:
//! the variable [`Environment`], the [`Navigator`] holding the current
//! namespace, a snapshot of the tree root and the [`Console`]. It owns none of
//! them, so the session decides what survives a failed or interrupted
//! statement.
//!
//! Evaluation is recursive through boxed futures, the same way nested blocks,
//! loops and `$( ... )` substitutions recurse through the AST. Every statement,
//! loop iteration, pipeline stage and remote call first checks the
//! cancellation token; an interrupt surfaces as [`ShellError::Interrupted`].
//!
//! # Name lookup
//!
//! A command word is looked up, in order, as a child namespace, a command of
//! the namespace reached so far, and a builtin command. A function call
//! `name(...)` tries builtin functions first, then user functions, then
//! commands of the current namespace, then builtin commands.
//!
//! A user function body sees the session scope and its own parameters, not
//! the locals of its caller.

pub mod builtins;
pub mod ops;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ast::{
    AssignTarget, BinOp, Block, CallArg, CommandInvocation, Expression, PathSegment, Pipeline,
    PropertyPath, Stage, Statement, StringPiece, UnaryOp,
};
use crate::console::Console;
use crate::env::Environment;
use crate::error::{EvalErrorKind, ShellError};
use crate::namespace::resolve::{self, Navigator};
use crate::namespace::{find_command, NamespaceRef};
use crate::output::{Output, ResultSet};
use crate::pipeline::{self, Age, SortKey};
use crate::remote::CommandArgs;
use crate::value::Value;

use builtins::{BuiltinCommand, FUNCTIONS};

/// Boxed future returned by the recursive evaluation entry points.
pub type EvalFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ShellError>> + Send + 'a>>;

/// Nested user function calls allowed before giving up.
pub const MAX_CALL_DEPTH: usize = 100;

/// How a statement finished.
enum Flow {
    Next(Output),
    Break,
    Return(Value),
}

fn break_outside_loop() -> ShellError {
    ShellError::eval(EvalErrorKind::Rejected, "'break' outside a loop")
}

fn return_outside_function() -> ShellError {
    ShellError::eval(EvalErrorKind::Rejected, "'return' outside a function")
}

/// Fails for a `break` or `return` that escaped everything that could take it.
fn finished(flow: Flow) -> Result<Output, ShellError> {
    match flow {
        Flow::Next(output) => Ok(output),
        Flow::Break => Err(break_outside_loop()),
        Flow::Return(_) => Err(return_outside_function()),
    }
}

pub struct Evaluator<'s> {
    env: &'s mut Environment,
    nav: &'s mut Navigator,
    root: NamespaceRef,
    console: &'s mut dyn Console,
    cancel: CancellationToken,
    /// Canonical paths of scripts currently being sourced.
    sources: Vec<PathBuf>,
    /// User function calls in progress.
    calls: usize,
}

impl<'s> Evaluator<'s> {
    pub fn new(
        env: &'s mut Environment,
        nav: &'s mut Navigator,
        root: NamespaceRef,
        console: &'s mut dyn Console,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            env,
            nav,
            root,
            console,
            cancel,
            sources: Vec::new(),
            calls: 0,
        }
    }

    /// Run one top-level statement.
    pub async fn run(&mut self, statement: &Statement) -> Result<Output, ShellError> {
        finished(self.exec(statement).await?)
    }

    fn checkpoint(&self) -> Result<(), ShellError> {
        if self.cancel.is_cancelled() {
            return Err(ShellError::Interrupted);
        }
        Ok(())
    }

    // ---- statements ----

    fn exec<'a>(&'a mut self, statement: &'a Statement) -> EvalFuture<'a, Flow> {
        Box::pin(async move {
            self.checkpoint()?;
            match statement {
                Statement::Assignment { target, value } => {
                    let value = self.eval(value).await?;
                    self.assign(target, value).await?;
                    Ok(Flow::Next(Output::None))
                }
                Statement::Expression(expr) => {
                    self.eval(expr).await?;
                    Ok(Flow::Next(Output::None))
                }
                Statement::Command(command) => Ok(Flow::Next(self.exec_command(command).await?)),
                Statement::Pipeline(pipeline) => {
                    Ok(Flow::Next(self.exec_pipeline(pipeline).await?))
                }
                Statement::ForLoop {
                    init,
                    condition,
                    step,
                    body,
                } => {
                    self.env.push_scope();
                    let result = self
                        .exec_for(init.as_deref(), condition.as_ref(), step.as_deref(), body)
                        .await;
                    self.env.pop_scope();
                    result
                }
                Statement::ForIn {
                    variable,
                    iterable,
                    body,
                } => {
                    let items = self.iterate(iterable).await?;
                    self.env.push_scope();
                    let result = self.exec_for_in(variable, items, body).await;
                    self.env.pop_scope();
                    result
                }
                Statement::While { condition, body } => {
                    loop {
                        self.checkpoint()?;
                        tokio::task::yield_now().await;
                        if !self.condition(condition).await? {
                            break;
                        }
                        match self.exec_block(body).await? {
                            Flow::Break => break,
                            Flow::Return(value) => return Ok(Flow::Return(value)),
                            Flow::Next(_) => {}
                        }
                    }
                    Ok(Flow::Next(Output::None))
                }
                Statement::Conditional {
                    condition,
                    then_block,
                    else_block,
                } => {
                    if self.condition(condition).await? {
                        self.exec_sequence(then_block).await
                    } else if let Some(block) = else_block {
                        self.exec_sequence(block).await
                    } else {
                        Ok(Flow::Next(Output::None))
                    }
                }
                Statement::Break => Ok(Flow::Break),
                Statement::Function(def) => {
                    if FUNCTIONS.contains(&def.name.as_str()) {
                        return Err(ShellError::eval(
                            EvalErrorKind::Rejected,
                            format!("cannot redefine builtin function '{}'", def.name),
                        ));
                    }
                    debug!(function = %def.name, params = def.params.len(), "defined function");
                    self.env.define_function(def.clone());
                    Ok(Flow::Next(Output::None))
                }
                Statement::Return(value) => {
                    let value = match value {
                        Some(expr) => self.eval(expr).await?,
                        None => Value::Null,
                    };
                    Ok(Flow::Return(value))
                }
                Statement::Undef(name) => {
                    if self.env.remove(name).is_none() && self.env.remove_function(name).is_none() {
                        return Err(undefined_variable(name));
                    }
                    Ok(Flow::Next(Output::None))
                }
            }
        })
    }

    /// Statements of a block in the current scope. Outputs of nested
    /// statements are not rendered; `print` is the way to show them.
    async fn exec_sequence(&mut self, block: &Block) -> Result<Flow, ShellError> {
        for statement in block {
            match self.exec(statement).await? {
                Flow::Next(Output::Exit) => return Ok(Flow::Next(Output::Exit)),
                Flow::Next(_) => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next(Output::None))
    }

    /// A loop body, in its own child scope.
    async fn exec_block(&mut self, block: &Block) -> Result<Flow, ShellError> {
        self.env.push_scope();
        let result = self.exec_sequence(block).await;
        self.env.pop_scope();
        result
    }

    async fn exec_for(
        &mut self,
        init: Option<&Statement>,
        condition: Option<&Expression>,
        step: Option<&Statement>,
        body: &Block,
    ) -> Result<Flow, ShellError> {
        if let Some(init) = init {
            finished(self.exec(init).await?)?;
        }
        loop {
            self.checkpoint()?;
            tokio::task::yield_now().await;
            if let Some(condition) = condition {
                if !self.condition(condition).await? {
                    break;
                }
            }
            match self.exec_block(body).await? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Next(_) => {}
            }
            if let Some(step) = step {
                finished(self.exec(step).await?)?;
            }
        }
        Ok(Flow::Next(Output::None))
    }

    async fn exec_for_in(
        &mut self,
        variable: &str,
        items: Vec<Value>,
        body: &Block,
    ) -> Result<Flow, ShellError> {
        for item in items {
            self.checkpoint()?;
            tokio::task::yield_now().await;
            self.env.define(variable, item);
            match self.exec_block(body).await? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Next(_) => {}
            }
        }
        Ok(Flow::Next(Output::None))
    }

    async fn iterate(&mut self, iterable: &Expression) -> Result<Vec<Value>, ShellError> {
        match self.eval(iterable).await? {
            Value::List(items) => Ok(items),
            Value::Dict(map) => Ok(map.into_keys().map(Value::String).collect()),
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            other => Err(ShellError::type_mismatch(format!(
                "{} is not iterable",
                other.type_name()
            ))),
        }
    }

    async fn condition(&mut self, expr: &Expression) -> Result<bool, ShellError> {
        let value = self.eval(expr).await?;
        ops::truth(&value, "condition")
    }

    async fn assign(&mut self, target: &AssignTarget, value: Value) -> Result<(), ShellError> {
        match target {
            AssignTarget::Variable(name) => {
                self.env.assign(name, value);
                Ok(())
            }
            AssignTarget::Subscript { name, keys } => {
                let mut path = Vec::with_capacity(keys.len());
                for key in keys {
                    path.push(self.eval(key).await?);
                }
                let slot = self.env.get_mut(name).ok_or_else(|| undefined_variable(name))?;
                ops::assign_path(slot, &path, value)
            }
            AssignTarget::Property(path) => {
                let owner = self.property_owner(path).await?;
                info!(path = %owner.path(), property = %path.property, "setting property");
                guarded(&self.cancel, owner.set_property(&path.property, value)).await
            }
        }
    }

    // ---- expressions ----

    fn eval<'a>(&'a mut self, expr: &'a Expression) -> EvalFuture<'a, Value> {
        Box::pin(async move {
            match expr {
                Expression::Literal(value) => Ok(value.clone()),
                Expression::Interpolated(pieces) => {
                    let mut text = String::new();
                    for piece in pieces {
                        match piece {
                            StringPiece::Text(t) => text.push_str(t),
                            StringPiece::Expr(e) => {
                                let value = self.eval(e).await?;
                                text.push_str(&value.to_string());
                            }
                        }
                    }
                    Ok(Value::String(text))
                }
                Expression::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item).await?);
                    }
                    Ok(Value::List(values))
                }
                Expression::Dict(entries) => {
                    let mut map = BTreeMap::new();
                    for (key, value) in entries {
                        let key = match self.eval(key).await? {
                            Value::String(k) => k,
                            other => {
                                return Err(ShellError::type_mismatch(format!(
                                    "dict keys are strings, got {}",
                                    other.type_name()
                                )))
                            }
                        };
                        let value = self.eval(value).await?;
                        map.insert(key, value);
                    }
                    Ok(Value::Dict(map))
                }
                Expression::Identifier(name) => self
                    .env
                    .get(name)
                    .cloned()
                    .ok_or_else(|| undefined_variable(name)),
                Expression::Unary { op, operand } => {
                    let value = self.eval(operand).await?;
                    match op {
                        UnaryOp::Neg => ops::negate(&value),
                        UnaryOp::Not => Ok(Value::Bool(!ops::truth(&value, "operand of 'not'")?)),
                    }
                }
                Expression::Binary { op, left, right } => match op {
                    BinOp::And | BinOp::Or => {
                        let lhs = self.eval(left).await?;
                        let lhs = ops::truth(&lhs, op.symbol())?;
                        // short circuit: `false and x` never evaluates x
                        if lhs == (*op == BinOp::Or) {
                            return Ok(Value::Bool(lhs));
                        }
                        let rhs = self.eval(right).await?;
                        Ok(Value::Bool(ops::truth(&rhs, op.symbol())?))
                    }
                    _ => {
                        let lhs = self.eval(left).await?;
                        let rhs = self.eval(right).await?;
                        ops::binary(*op, &lhs, &rhs)
                    }
                },
                Expression::Index { target, index } => {
                    let target = self.eval(target).await?;
                    let index = self.eval(index).await?;
                    ops::index(&target, &index)
                }
                Expression::Member { target, name } => {
                    let target = self.eval(target).await?;
                    ops::member(&target, name)
                }
                Expression::FunctionCall(call) => self.call_function(call).await,
                Expression::PropertyPath(path) => {
                    let owner = self.property_owner(path).await?;
                    guarded(&self.cancel, owner.get_property(&path.property)).await
                }
                Expression::Substitution(statement) => {
                    Ok(finished(self.exec(statement).await?)?.into_value())
                }
            }
        })
    }

    /// The namespace a property path reads from or writes to.
    async fn property_owner(&mut self, path: &PropertyPath) -> Result<NamespaceRef, ShellError> {
        let start = if path.absolute {
            self.root.clone()
        } else {
            self.nav.current().clone()
        };
        let segments: Vec<PathSegment> = path
            .segments
            .iter()
            .map(|s| PathSegment::Name(s.clone()))
            .collect();
        guarded(&self.cancel, resolve::resolve(&self.root, &start, self.nav.previous(), &segments))
            .await
    }

    async fn eval_args(&mut self, args: &[CallArg]) -> Result<CommandArgs, ShellError> {
        let mut out = CommandArgs::default();
        for arg in args {
            match arg {
                CallArg::Positional(expr) => out.positional.push(self.eval(expr).await?),
                CallArg::Named(name, expr) => {
                    let value = self.eval(expr).await?;
                    out.named.push((name.clone(), value));
                }
            }
        }
        Ok(out)
    }

    // ---- commands ----

    /// Walk the command path. The first word that is not a child names the
    /// command; any words after it become leading positional arguments.
    async fn exec_command(&mut self, command: &CommandInvocation) -> Result<Output, ShellError> {
        let previous = self.nav.previous().cloned();
        let mut node = self.nav.current().clone();
        let mut used_previous = false;

        for (i, segment) in command.path.iter().enumerate() {
            if *segment == PathSegment::Previous {
                used_previous = true;
            }
            let next = guarded(
                &self.cancel,
                resolve::step(&self.root, &node, previous.as_ref(), segment),
            )
            .await?;
            match next {
                Some(child) => node = child,
                None => {
                    let leading = command.path[i + 1..]
                        .iter()
                        .map(|s| Value::String(s.as_word().to_string()))
                        .collect();
                    return self
                        .dispatch(&node, segment.as_word(), leading, &command.args)
                        .await;
                }
            }
        }

        if !command.args.is_empty() {
            return Err(ShellError::eval(
                EvalErrorKind::UndefinedCommand,
                format!("'{}' is a namespace, not a command", node.path()),
            ));
        }
        let listing = guarded(&self.cancel, node.list_children()).await?;
        self.nav.enter(node, used_previous);
        Ok(Output::Listing(listing))
    }

    async fn dispatch(
        &mut self,
        node: &NamespaceRef,
        name: &str,
        mut leading: Vec<Value>,
        args: &[CallArg],
    ) -> Result<Output, ShellError> {
        let mut args = self.eval_args(args).await?;
        leading.append(&mut args.positional);
        args.positional = leading;

        if guarded(&self.cancel, find_command(node, name)).await?.is_some() {
            info!(path = %node.path(), command = name, "invoking command");
            return guarded(&self.cancel, node.invoke(name, args)).await;
        }
        match BuiltinCommand::from_name(name) {
            Some(builtin) => self.run_builtin_command(builtin, node, args).await,
            None => Err(ShellError::not_found(name)),
        }
    }

    // ---- pipelines ----

    async fn exec_pipeline(&mut self, pipeline: &Pipeline) -> Result<Output, ShellError> {
        let mut table = match self.exec_command(&pipeline.source).await? {
            Output::Table(table) => table,
            other => {
                return Err(ShellError::type_mismatch(format!(
                    "pipeline input must be a table, got {}",
                    output_name(&other)
                )))
            }
        };
        for stage in &pipeline.stages {
            self.checkpoint()?;
            debug!(stage = %stage.name, rows = table.len(), "pipeline stage");
            table = self.apply_stage(stage, &table).await?;
        }
        Ok(Output::Table(table))
    }

    async fn apply_stage(&mut self, stage: &Stage, input: &ResultSet) -> Result<ResultSet, ShellError> {
        match stage.name.as_str() {
            "select" => {
                let args = self.eval_args(&stage.args).await?;
                let mut columns = Vec::new();
                for value in args.positional {
                    match value {
                        Value::List(items) => columns.extend(items.iter().map(|v| v.to_string())),
                        other => columns.push(other.to_string()),
                    }
                }
                pipeline::select(input, &columns)
            }
            "sort" => {
                let mut keys = Vec::with_capacity(stage.args.len());
                for arg in &stage.args {
                    match arg {
                        CallArg::Positional(expr) => {
                            let word = self.eval(expr).await?;
                            keys.push(SortKey::parse(&word.to_string()));
                        }
                        CallArg::Named(column, expr) => {
                            let direction = self.eval(expr).await?;
                            keys.push(SortKey::with_direction(column, &direction)?);
                        }
                    }
                }
                pipeline::sort(input, &keys)
            }
            "limit" => {
                let args = self.eval_args(&stage.args).await?;
                match args.positional.as_slice() {
                    [count] if args.named.is_empty() => pipeline::limit(input, count),
                    _ => Err(ShellError::arity("limit takes exactly one count")),
                }
            }
            "search" | "exclude" => {
                let keep = stage.name == "search";
                let predicate = match stage.args.as_slice() {
                    [CallArg::Positional(expr)] => expr,
                    _ => {
                        return Err(ShellError::arity(format!(
                            "{} takes exactly one predicate",
                            stage.name
                        )))
                    }
                };
                let mut out = ResultSet::new(input.columns.clone());
                for row in &input.rows {
                    self.checkpoint()?;
                    pipeline::bind_row(self.env, row);
                    let matched = self.eval(predicate).await;
                    self.env.pop_scope();
                    if ops::truth(&matched?, "predicate")? == keep {
                        out.rows.push(row.clone());
                    }
                }
                Ok(out)
            }
            "older_than" | "newer_than" => {
                let args = self.eval_args(&stage.args).await?;
                let (span, column) = match (args.positional.as_slice(), args.named.is_empty()) {
                    ([span], true) => (span, pipeline::STARTED_AT),
                    ([span, Value::String(column)], true) => (span, column.as_str()),
                    _ => {
                        return Err(ShellError::arity(format!(
                            "{} takes a time span and an optional column",
                            stage.name
                        )))
                    }
                };
                let age = if stage.name == "older_than" {
                    Age::Older
                } else {
                    Age::Newer
                };
                pipeline::filter_age(input, column, age, pipeline::parse_span(span)?, Utc::now())
            }
            other => Err(ShellError::eval(
                EvalErrorKind::UndefinedCommand,
                format!("unknown pipeline stage '{}'", other),
            )),
        }
    }
}

/// Await `fut` unless `cancel` fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, ShellError>>,
) -> Result<T, ShellError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ShellError::Interrupted),
        result = fut => result,
    }
}

fn undefined_variable(name: &str) -> ShellError {
    ShellError::eval(
        EvalErrorKind::UndefinedVariable,
        format!("undefined variable '{}'", name),
    )
}

fn output_name(output: &Output) -> &'static str {
    match output {
        Output::None => "nothing",
        Output::Value(_) => "a value",
        Output::Item(_) => "an item",
        Output::Table(_) => "a table",
        Output::Listing(_) => "a listing",
        Output::Exit => "exit",
    }
}
