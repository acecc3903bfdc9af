//! Error taxonomy for the shell.
//!
//! Every failure the core can produce is a [`ShellError`]. Errors are plain
//! values: they carry a stable kind name, a message, and a source position
//! when one is known, so a renderer can display them uniformly and scripts
//! can map them to exit codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A location in the input text.
///
/// `line` and `column` are 1-based; `offset` is the 0-based character index
/// into the source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Sub-classification of evaluation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalErrorKind {
    UndefinedVariable,
    UndefinedCommand,
    TypeMismatch,
    ArityMismatch,
    DivisionByZero,
    Index,
    Key,
    Overflow,
    Rejected,
    Recursion,
    /// `assert(...)` saw a false condition.
    Assertion,
}

impl EvalErrorKind {
    /// User-facing error class name.
    pub fn name(&self) -> &'static str {
        match self {
            EvalErrorKind::UndefinedVariable => "NameError",
            EvalErrorKind::UndefinedCommand => "CommandError",
            EvalErrorKind::TypeMismatch => "TypeError",
            EvalErrorKind::ArityMismatch => "ArityError",
            EvalErrorKind::DivisionByZero => "ZeroDivisionError",
            EvalErrorKind::Index => "IndexError",
            EvalErrorKind::Key => "KeyError",
            EvalErrorKind::Overflow => "OverflowError",
            EvalErrorKind::Rejected => "ValueError",
            EvalErrorKind::Recursion => "RecursionError",
            EvalErrorKind::Assertion => "AssertionError",
        }
    }
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error reported by the collaborator. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} [{code}]")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub const TIMEOUT: &'static str = "ETIMEDOUT";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// A remote call that did not answer within the configured deadline.
    pub fn timeout(operation: &str, millis: u64) -> Self {
        Self::new(
            Self::TIMEOUT,
            format!("{} timed out after {}ms", operation, millis),
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.code == Self::TIMEOUT
    }
}

/// Errors produced while lexing, parsing or evaluating shell input.
#[derive(Debug, Clone, Error)]
pub enum ShellError {
    #[error("unexpected character '{ch}' at {position}")]
    Lex { position: Position, ch: char },

    /// Integer literal outside the 64-bit range.
    #[error("integer literal '{text}' at {position} is too large")]
    LiteralTooLarge { position: Position, text: String },

    #[error("unexpected {token} at {position}, expected {expected}")]
    Parse {
        token: String,
        expected: String,
        position: Position,
        /// Input ended while a block, list or call was still open.
        incomplete: bool,
    },

    #[error("{detail}")]
    Eval { kind: EvalErrorKind, detail: String },

    #[error("property '{property}' is read-only")]
    ReadOnly { property: String },

    #[error("'{segment}' not found")]
    NotFound { segment: String },

    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Domain(String),

    #[error("end of input stream")]
    Eof,

    #[error("interrupted")]
    Interrupted,

    #[error("{0}")]
    Io(String),
}

impl ShellError {
    pub fn eval(kind: EvalErrorKind, detail: impl Into<String>) -> Self {
        ShellError::Eval {
            kind,
            detail: detail.into(),
        }
    }

    pub fn type_mismatch(detail: impl Into<String>) -> Self {
        Self::eval(EvalErrorKind::TypeMismatch, detail)
    }

    pub fn arity(detail: impl Into<String>) -> Self {
        Self::eval(EvalErrorKind::ArityMismatch, detail)
    }

    pub fn not_found(segment: impl Into<String>) -> Self {
        ShellError::NotFound {
            segment: segment.into(),
        }
    }

    /// Stable error class name, e.g. `"ParseError"` or `"TypeError"`.
    pub fn kind(&self) -> &'static str {
        match self {
            ShellError::Lex { .. } | ShellError::LiteralTooLarge { .. } => "LexError",
            ShellError::Parse { .. } => "ParseError",
            ShellError::Eval { kind, .. } => kind.name(),
            ShellError::ReadOnly { .. } => "ReadOnlyError",
            ShellError::NotFound { .. } => "NotFoundError",
            ShellError::Remote(_) => "RemoteError",
            ShellError::Domain(_) => "DomainError",
            ShellError::Eof => "EOFError",
            ShellError::Interrupted => "Interrupted",
            ShellError::Io(_) => "IOError",
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            ShellError::Lex { position, .. }
            | ShellError::LiteralTooLarge { position, .. }
            | ShellError::Parse { position, .. } => {
                Some(*position)
            }
            _ => None,
        }
    }

    /// True when the parser ran out of input inside an open construct.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ShellError::Parse { incomplete: true, .. })
    }

    pub fn eval_kind(&self) -> Option<EvalErrorKind> {
        match self {
            ShellError::Eval { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Process exit code used when a script fails.
    pub fn exit_code(&self) -> u8 {
        match self {
            ShellError::Lex { .. }
            | ShellError::LiteralTooLarge { .. }
            | ShellError::Parse { .. } => 2,
            ShellError::Remote(_) => 3,
            ShellError::Io(_) => 4,
            ShellError::Interrupted => 130,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for ShellError {
    fn from(e: std::io::Error) -> Self {
        ShellError::Io(e.to_string())
    }
}
