use crate::error::Position;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

pub type Block = Vec<Statement>;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assignment {
        target: AssignTarget,
        value: Expression,
    },
    /// A standalone function call; its result is discarded.
    Expression(Expression),
    Command(CommandInvocation),
    Pipeline(Pipeline),
    ForLoop {
        init: Option<Box<Statement>>,
        condition: Option<Expression>,
        step: Option<Box<Statement>>,
        body: Block,
    },
    ForIn {
        variable: String,
        iterable: Expression,
        body: Block,
    },
    While {
        condition: Expression,
        body: Block,
    },
    Conditional {
        condition: Expression,
        then_block: Block,
        else_block: Option<Block>,
    },
    Break,
    /// `function name(params) { body }`
    Function(FunctionDef),
    /// `return` or `return expr`; only valid inside a function body.
    Return(Option<Expression>),
    /// `undef name`: drop a variable or user function.
    Undef(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Variable(String),
    /// `name[k1][k2] = v` or `name.k = v`.
    Subscript { name: String, keys: Vec<Expression> },
    Property(PropertyPath),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Interpolated(Vec<StringPiece>),
    List(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Index {
        target: Box<Expression>,
        index: Box<Expression>,
    },
    Member {
        target: Box<Expression>,
        name: String,
    },
    FunctionCall(FunctionCall),
    PropertyPath(PropertyPath),
    /// `$( command )`: the command's output as a value.
    Substitution(Box<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPiece {
    Text(String),
    Expr(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<CallArg>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Positional(Expression),
    Named(String, Expression),
}

/// `/a/b.prop` (absolute) or `.prop` (current namespace).
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPath {
    pub absolute: bool,
    pub segments: Vec<String>,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// `/`
    Root,
    /// `..`
    Parent,
    /// `-`
    Previous,
    Name(String),
}

impl PathSegment {
    pub fn as_word(&self) -> &str {
        match self {
            PathSegment::Root => "/",
            PathSegment::Parent => "..",
            PathSegment::Previous => "-",
            PathSegment::Name(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    /// Leading words; which of them name namespaces and which name the
    /// command is decided during evaluation.
    pub path: Vec<PathSegment>,
    pub args: Vec<CallArg>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub source: CommandInvocation,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub args: Vec<CallArg>,
    pub position: Position,
}
