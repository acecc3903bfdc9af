//! Functions and commands provided by the shell itself.

use tracing::{debug, info};

use crate::ast::{FunctionCall, FunctionDef};
use crate::error::{EvalErrorKind, ShellError};
use crate::namespace::{find_command, NamespaceRef};
use crate::output::{Output, ResultSet};
use crate::parser;
use crate::remote::{CommandArgs, NodePath};
use crate::value::Value;

use super::{guarded, ops, Evaluator, Flow, MAX_CALL_DEPTH};

/// Functions callable as `name(...)` anywhere.
pub const FUNCTIONS: &[&str] = &[
    "print",
    "readline",
    "factorial",
    "str",
    "length",
    "range",
    "sum",
    "cwd",
    "get",
    "set",
    "assert",
    "append",
    "remove",
    "copy",
];

/// Longest list `range()` will build.
pub const RANGE_LIMIT: usize = 1_000_000;

/// Commands available in every namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    Help,
    Ls,
    Pwd,
    Echo,
    Vars,
    Source,
    Exit,
}

impl BuiltinCommand {
    pub const ALL: &'static [BuiltinCommand] = &[
        BuiltinCommand::Help,
        BuiltinCommand::Ls,
        BuiltinCommand::Pwd,
        BuiltinCommand::Echo,
        BuiltinCommand::Vars,
        BuiltinCommand::Source,
        BuiltinCommand::Exit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCommand::Help => "help",
            BuiltinCommand::Ls => "ls",
            BuiltinCommand::Pwd => "pwd",
            BuiltinCommand::Echo => "echo",
            BuiltinCommand::Vars => "vars",
            BuiltinCommand::Source => "source",
            BuiltinCommand::Exit => "exit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinCommand::Help => "List the commands available here",
            BuiltinCommand::Ls => "List child namespaces",
            BuiltinCommand::Pwd => "Show the current path",
            BuiltinCommand::Echo => "Print the arguments",
            BuiltinCommand::Vars => "Show all variables",
            BuiltinCommand::Source => "Run a script file",
            BuiltinCommand::Exit => "Leave the shell",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

fn expect_count(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ShellError> {
    if args.len() < min || args.len() > max {
        let wanted = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(ShellError::arity(format!(
            "{}() takes {} argument(s), got {}",
            name,
            wanted,
            args.len()
        )));
    }
    Ok(())
}

fn int_arg(function: &str, value: &Value) -> Result<i64, ShellError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(ShellError::type_mismatch(format!(
            "{}() expects an integer, got {}",
            function,
            other.type_name()
        ))),
    }
}

fn string_arg<'v>(function: &str, value: &'v Value) -> Result<&'v str, ShellError> {
    value.as_str().ok_or_else(|| {
        ShellError::type_mismatch(format!(
            "{}() expects a string, got {}",
            function,
            value.type_name()
        ))
    })
}

fn joined(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `n!` for `0 <= n`; 21! and up do not fit an integer.
pub fn factorial(value: &Value) -> Result<Value, ShellError> {
    let n = match value {
        Value::Int(n) if *n >= 0 => *n,
        other => {
            return Err(ShellError::Domain(format!(
                "factorial() is only defined for non-negative integers, got '{}'",
                other
            )))
        }
    };
    (1..=n)
        .try_fold(1i64, |acc, k| acc.checked_mul(k))
        .map(Value::Int)
        .ok_or_else(|| {
            ShellError::eval(
                EvalErrorKind::Overflow,
                format!("factorial({}) does not fit an integer", n),
            )
        })
}

fn length(value: &Value) -> Result<Value, ShellError> {
    let n = match value {
        Value::List(items) => items.len(),
        Value::Dict(map) => map.len(),
        Value::String(s) => s.chars().count(),
        other => {
            return Err(ShellError::type_mismatch(format!(
                "{} has no length",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

fn range(args: &[Value]) -> Result<Value, ShellError> {
    let (start, end) = match args {
        [end] => (0, int_arg("range", end)?),
        [start, end] => (int_arg("range", start)?, int_arg("range", end)?),
        _ => return expect_count("range", args, 1, 2).map(|_| Value::Null),
    };
    let len = (end as i128 - start as i128).max(0);
    if len > RANGE_LIMIT as i128 {
        return Err(ShellError::eval(
            EvalErrorKind::Overflow,
            format!(
                "range({}, {}) would hold {} items, at most {} allowed",
                start, end, len, RANGE_LIMIT
            ),
        ));
    }
    Ok(Value::List((start..end).map(Value::Int).collect()))
}

fn list_arg<'v>(function: &str, value: &'v Value) -> Result<&'v [Value], ShellError> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(ShellError::type_mismatch(format!(
            "{}() expects a list, got {}",
            function,
            other.type_name()
        ))),
    }
}

/// A copy of `list` with `item` at the end.
fn append(list: &Value, item: &Value) -> Result<Value, ShellError> {
    let mut items = list_arg("append", list)?.to_vec();
    items.push(item.clone());
    Ok(Value::List(items))
}

/// A copy of `list` without the first element equal to `item`.
fn remove(list: &Value, item: &Value) -> Result<Value, ShellError> {
    let mut items = list_arg("remove", list)?.to_vec();
    match items.iter().position(|v| v.loose_eq(item)) {
        Some(at) => {
            items.remove(at);
            Ok(Value::List(items))
        }
        None => Err(ShellError::eval(
            EvalErrorKind::Rejected,
            format!("remove(): '{}' is not in the list", item),
        )),
    }
}

fn assertion(args: &[Value]) -> Result<Value, ShellError> {
    expect_count("assert", args, 1, 2)?;
    if ops::truth(&args[0], "assert() condition")? {
        return Ok(Value::Null);
    }
    let message = match args.get(1) {
        Some(message) => message.to_string(),
        None => "assertion failed".to_string(),
    };
    Err(ShellError::eval(EvalErrorKind::Assertion, message))
}

fn sum(value: &Value) -> Result<Value, ShellError> {
    match value {
        Value::List(items) => items.iter().try_fold(Value::Int(0), |acc, item| {
            if !item.is_number() {
                return Err(ShellError::type_mismatch(format!(
                    "sum() expects numbers, got {}",
                    item.type_name()
                )));
            }
            ops::binary(crate::ast::BinOp::Add, &acc, item)
        }),
        other => Err(ShellError::type_mismatch(format!(
            "sum() expects a list, got {}",
            other.type_name()
        ))),
    }
}

impl<'s> Evaluator<'s> {
    pub(super) async fn call_function(&mut self, call: &FunctionCall) -> Result<Value, ShellError> {
        let args = self.eval_args(&call.args).await?;
        let name = call.name.as_str();

        if FUNCTIONS.contains(&name) {
            if !args.named.is_empty() {
                return Err(ShellError::arity(format!(
                    "{}() takes no named arguments",
                    name
                )));
            }
            return self.call_builtin(name, args.positional).await;
        }
        if let Some(def) = self.env.function(name) {
            return self.call_user(&def, args).await;
        }

        let node = self.nav.current().clone();
        if guarded(&self.cancel, find_command(&node, name)).await?.is_some() {
            info!(path = %node.path(), command = name, "invoking command");
            return Ok(guarded(&self.cancel, node.invoke(name, args)).await?.into_value());
        }
        match BuiltinCommand::from_name(name) {
            Some(builtin) => Ok(self
                .run_builtin_command(builtin, &node, args)
                .await?
                .into_value()),
            None => Err(ShellError::eval(
                EvalErrorKind::UndefinedCommand,
                format!("undefined function '{}'", name),
            )),
        }
    }

    /// Run a user function with its parameters bound positionally.
    async fn call_user(&mut self, def: &FunctionDef, args: CommandArgs) -> Result<Value, ShellError> {
        if !args.named.is_empty() {
            return Err(ShellError::arity(format!(
                "{}() takes no named arguments",
                def.name
            )));
        }
        if args.positional.len() != def.params.len() {
            return Err(ShellError::arity(format!(
                "{}() takes {} argument(s), got {}",
                def.name,
                def.params.len(),
                args.positional.len()
            )));
        }
        if self.calls >= MAX_CALL_DEPTH {
            return Err(ShellError::eval(
                EvalErrorKind::Recursion,
                format!(
                    "{}() exceeded the maximum call depth of {}",
                    def.name, MAX_CALL_DEPTH
                ),
            ));
        }

        let frame = self
            .env
            .enter_call(def.params.iter().cloned().zip(args.positional));
        self.calls += 1;
        let result = self.exec_sequence(&def.body).await;
        self.calls -= 1;
        self.env.leave_call(frame);

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Next(_) => Ok(Value::Null),
            Flow::Break => Err(super::break_outside_loop()),
        }
    }

    async fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ShellError> {
        match name {
            "print" => {
                self.console.write_line(&joined(&args));
                Ok(Value::Null)
            }
            "readline" => {
                expect_count(name, &args, 0, 1)?;
                let prompt = match args.first() {
                    Some(p) => p.to_string(),
                    None => String::new(),
                };
                let cancel = self.cancel.clone();
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ShellError::Interrupted),
                    line = self.console.read_line(&prompt) => line?,
                };
                line.map(Value::String).ok_or(ShellError::Eof)
            }
            "factorial" => {
                expect_count(name, &args, 1, 1)?;
                factorial(&args[0])
            }
            "str" => {
                expect_count(name, &args, 1, 1)?;
                Ok(Value::String(args[0].to_string()))
            }
            "length" => {
                expect_count(name, &args, 1, 1)?;
                length(&args[0])
            }
            "range" => range(&args),
            "sum" => {
                expect_count(name, &args, 1, 1)?;
                sum(&args[0])
            }
            "cwd" => {
                expect_count(name, &args, 0, 0)?;
                Ok(Value::String(self.nav.current().path().to_string()))
            }
            "get" => {
                expect_count(name, &args, 2, 2)?;
                let node = self.node_at(string_arg(name, &args[0])?).await?;
                let property = string_arg(name, &args[1])?;
                guarded(&self.cancel, node.get_property(property)).await
            }
            "assert" => assertion(&args),
            "append" => {
                expect_count(name, &args, 2, 2)?;
                append(&args[0], &args[1])
            }
            "remove" => {
                expect_count(name, &args, 2, 2)?;
                remove(&args[0], &args[1])
            }
            "copy" => {
                expect_count(name, &args, 1, 1)?;
                Ok(args[0].clone())
            }
            "set" => {
                expect_count(name, &args, 3, 3)?;
                let node = self.node_at(string_arg(name, &args[0])?).await?;
                let property = string_arg(name, &args[1])?;
                info!(path = %node.path(), property, "setting property");
                guarded(&self.cancel, node.set_property(property, args[2].clone())).await?;
                Ok(Value::Null)
            }
            other => Err(ShellError::eval(
                EvalErrorKind::UndefinedCommand,
                format!("undefined function '{}'", other),
            )),
        }
    }

    /// Resolve a textual path, absolute or relative to the current namespace.
    async fn node_at(&mut self, text: &str) -> Result<NamespaceRef, ShellError> {
        let start = if text.starts_with('/') {
            self.root.clone()
        } else {
            self.nav.current().clone()
        };
        let segments: Vec<_> = NodePath::parse(text)
            .segments()
            .iter()
            .map(|s| match s.as_str() {
                ".." => crate::ast::PathSegment::Parent,
                name => crate::ast::PathSegment::Name(name.to_string()),
            })
            .collect();
        guarded(
            &self.cancel,
            crate::namespace::resolve::resolve(&self.root, &start, self.nav.previous(), &segments),
        )
        .await
    }

    pub(super) async fn run_builtin_command(
        &mut self,
        command: BuiltinCommand,
        node: &NamespaceRef,
        args: CommandArgs,
    ) -> Result<Output, ShellError> {
        debug!(command = command.name(), path = %node.path(), "builtin command");
        match command {
            BuiltinCommand::Help => {
                let mut table = ResultSet::with_columns(&["command", "description"]);
                for descriptor in guarded(&self.cancel, node.list_commands()).await? {
                    table.push_row(vec![
                        Value::String(descriptor.name),
                        Value::String(descriptor.description),
                    ]);
                }
                for builtin in BuiltinCommand::ALL {
                    table.push_row(vec![
                        Value::from(builtin.name()),
                        Value::from(builtin.description()),
                    ]);
                }
                Ok(Output::Table(table))
            }
            BuiltinCommand::Ls => Ok(Output::Listing(
                guarded(&self.cancel, node.list_children()).await?,
            )),
            BuiltinCommand::Pwd => Ok(Output::Value(Value::String(node.path().to_string()))),
            BuiltinCommand::Echo => {
                let mut words: Vec<String> = args.positional.iter().map(|v| v.to_string()).collect();
                words.extend(args.named.iter().map(|(k, v)| format!("{}={}", k, v)));
                self.console.write_line(&words.join(" "));
                Ok(Output::None)
            }
            BuiltinCommand::Vars => {
                let mut table = ResultSet::with_columns(&["name", "type", "value"]);
                for (name, value) in self.env.visible() {
                    table.push_row(vec![
                        Value::from(name),
                        Value::from(value.type_name()),
                        value.clone(),
                    ]);
                }
                Ok(Output::Table(table))
            }
            BuiltinCommand::Source => {
                if args.positional.is_empty() || !args.named.is_empty() {
                    return Err(ShellError::arity("source takes one or more file paths"));
                }
                for path in &args.positional {
                    self.source_file(&path.to_string()).await?;
                }
                Ok(Output::None)
            }
            BuiltinCommand::Exit => Ok(Output::Exit),
        }
    }

    /// Run a script file in the current session. Statement outputs inside
    /// the script are discarded.
    async fn source_file(&mut self, path: &str) -> Result<(), ShellError> {
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| ShellError::Io(format!("{}: {}", path, e)))?;
        if self.sources.contains(&canonical) {
            return Err(ShellError::eval(
                EvalErrorKind::Recursion,
                format!("'{}' is already being sourced", canonical.display()),
            ));
        }
        let text = tokio::fs::read_to_string(&canonical)
            .await
            .map_err(|e| ShellError::Io(format!("{}: {}", path, e)))?;
        let script = parser::parse(&text)?;
        info!(path = %canonical.display(), statements = script.statements.len(), "sourcing script");

        self.sources.push(canonical);
        let mut result = Ok(());
        for statement in &script.statements {
            match self.exec(statement).await {
                Ok(Flow::Next(Output::Exit)) => break,
                Ok(Flow::Next(_)) => {}
                Ok(flow) => {
                    result = super::finished(flow).map(|_| ());
                    break;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.sources.pop();
        result
    }
}
