use crate::ast::*;
use crate::error::{Position, ShellError};
use crate::lexer::{tokenize, tokenize_at, StrPart, Token, TokenKind};
use crate::value::Value;

/// Tokenize and parse a line or script.
///
/// The whole input is parsed before anything runs, so a syntax error
/// anywhere means no statement is executed.
pub fn parse(source: &str) -> Result<Script, ShellError> {
    parse_tokens(tokenize(source)?)
}

pub fn parse_tokens(tokens: Vec<Token>) -> Result<Script, ShellError> {
    Parser::new(tokens).parse_script()
}

/// Stage names accepted after `|`.
pub const STAGES: &[&str] = &[
    "select",
    "sort",
    "limit",
    "search",
    "exclude",
    "older_than",
    "newer_than",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Number of open blocks, brackets and argument lists.
    nesting: usize,
    /// Number of enclosing function bodies.
    functions: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            functions: 0,
        }
    }

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(idx)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn position(&self) -> Position {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.position)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<(), ShellError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String, ShellError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn error(&self, expected: &str) -> ShellError {
        let at_end = matches!(self.peek(), TokenKind::Eof);
        ShellError::Parse {
            token: self.peek().to_string(),
            expected: expected.to_string(),
            position: self.position(),
            incomplete: at_end && self.nesting > 0,
        }
    }

    /// Whether the next two tokens are written with no space between them.
    fn adjacent(&self) -> bool {
        match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
            (Some(a), Some(b)) => a.position.offset + a.literal.chars().count() == b.position.offset,
            _ => false,
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::RBrace
                | TokenKind::RParen
                | TokenKind::Pipe
        )
    }

    fn parse_script(&mut self) -> Result<Script, ShellError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.check(&TokenKind::Eof) {
                break;
            }
            statements.push(self.parse_statement()?);
            if !matches!(
                self.peek(),
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
            ) {
                return Err(self.error("';' or end of line"));
            }
        }
        Ok(Script { statements })
    }

    fn parse_block(&mut self) -> Result<Block, ShellError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.nesting += 1;
        let mut body = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(self.error("'}'")),
                _ => {}
            }
            body.push(self.parse_statement()?);
            if !matches!(
                self.peek(),
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace
            ) {
                return Err(self.error("';', end of line or '}'"));
            }
        }
        self.advance();
        self.nesting -= 1;
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Statement, ShellError> {
        match self.peek().clone() {
            TokenKind::For => self.parse_for(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                Ok(Statement::While { condition, body })
            }
            TokenKind::Break => {
                self.advance();
                Ok(Statement::Break)
            }
            TokenKind::Function => self.parse_function(),
            TokenKind::Return => {
                if self.functions == 0 {
                    return Err(self.error("a statement; 'return' is only valid inside a function"));
                }
                self.advance();
                if self.at_statement_end() {
                    Ok(Statement::Return(None))
                } else {
                    Ok(Statement::Return(Some(self.parse_expression()?)))
                }
            }
            TokenKind::Undef => {
                self.advance();
                Ok(Statement::Undef(self.expect_ident("name after 'undef'")?))
            }
            TokenKind::Ident(name) => match self.peek_at(1) {
                TokenKind::Assign => {
                    self.advance();
                    self.advance();
                    let value = self.parse_expression()?;
                    Ok(Statement::Assignment {
                        target: AssignTarget::Variable(name),
                        value,
                    })
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot => {
                    self.parse_expression_statement()
                }
                _ => self.parse_command_statement(),
            },
            TokenKind::Slash | TokenKind::Dot => {
                let start = self.pos;
                if let Some(path) = self.try_property_path() {
                    if self.eat(&TokenKind::Assign) {
                        let value = self.parse_expression()?;
                        return Ok(Statement::Assignment {
                            target: AssignTarget::Property(path),
                            value,
                        });
                    }
                }
                self.pos = start;
                if self.check(&TokenKind::Slash) {
                    self.parse_command_statement()
                } else {
                    self.parse_expression_statement()
                }
            }
            TokenKind::DotDot => self.parse_command_statement(),
            TokenKind::Minus
                if matches!(
                    self.peek_at(1),
                    TokenKind::Newline
                        | TokenKind::Semicolon
                        | TokenKind::Eof
                        | TokenKind::RBrace
                        | TokenKind::Ident(_)
                        | TokenKind::Slash
                        | TokenKind::DotDot
                        | TokenKind::Pipe
                ) =>
            {
                self.parse_command_statement()
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// Only calls may stand alone; anything else (`2*3`, `a[0]`) would have
    /// no effect and is rejected.
    fn parse_expression_statement(&mut self) -> Result<Statement, ShellError> {
        let start = self.pos;
        let expr = self.parse_expression()?;
        if self.eat(&TokenKind::Assign) {
            let target = match expr {
                Expression::Identifier(name) => AssignTarget::Variable(name),
                other => subscript_target(other)
                    .ok_or_else(|| self.error_at(start, "assignable expression"))?,
            };
            let value = self.parse_expression()?;
            return Ok(Statement::Assignment { target, value });
        }
        match expr {
            Expression::FunctionCall(_) => Ok(Statement::Expression(expr)),
            _ => Err(self.error_at(start, "assignment, function call or command")),
        }
    }

    fn error_at(&self, index: usize, expected: &str) -> ShellError {
        let token = self.tokens.get(index);
        ShellError::Parse {
            token: token
                .map(|t| t.kind.to_string())
                .unwrap_or_else(|| TokenKind::Eof.to_string()),
            expected: expected.to_string(),
            position: token.map(|t| t.position).unwrap_or_default(),
            incomplete: false,
        }
    }

    fn parse_for(&mut self) -> Result<Statement, ShellError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'(' after 'for'")?;
        self.nesting += 1;

        if let (TokenKind::Ident(variable), TokenKind::In) = (self.peek().clone(), self.peek_at(1).clone()) {
            self.advance();
            self.advance();
            let iterable = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')'")?;
            self.nesting -= 1;
            let body = self.parse_block()?;
            return Ok(Statement::ForIn {
                variable,
                iterable,
                body,
            });
        }

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_statement()?))
        };
        self.expect(&TokenKind::Semicolon, "';' after loop initializer")?;
        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after loop condition")?;
        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_statement()?))
        };
        self.expect(&TokenKind::RParen, "')'")?;
        self.nesting -= 1;
        let body = self.parse_block()?;
        Ok(Statement::ForLoop {
            init,
            condition,
            step,
            body,
        })
    }

    fn parse_function(&mut self) -> Result<Statement, ShellError> {
        let position = self.position();
        self.advance();
        let name = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "'(' after function name")?;
        self.nesting += 1;
        let mut params: Vec<String> = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let at = self.pos;
                let param = self.expect_ident("parameter name")?;
                if params.contains(&param) {
                    return Err(self.error_at(at, "distinct parameter names"));
                }
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "',' or ')'")?;
        self.nesting -= 1;
        self.skip_newlines();

        self.functions += 1;
        let body = self.parse_block();
        self.functions -= 1;
        Ok(Statement::Function(FunctionDef {
            name,
            params,
            body: body?,
            position,
        }))
    }

    fn parse_if(&mut self) -> Result<Statement, ShellError> {
        self.advance();
        let condition = self.parse_expression()?;
        let then_block = self.parse_block()?;

        let mut lookahead = 0;
        while matches!(self.peek_at(lookahead), TokenKind::Newline) {
            lookahead += 1;
        }
        let else_block = if matches!(self.peek_at(lookahead), TokenKind::Else) {
            self.pos += lookahead + 1;
            if self.check(&TokenKind::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(Statement::Conditional {
            condition,
            then_block,
            else_block,
        })
    }

    fn parse_command_statement(&mut self) -> Result<Statement, ShellError> {
        let source = self.parse_command()?;
        if !self.check(&TokenKind::Pipe) {
            return Ok(Statement::Command(source));
        }
        let mut stages = Vec::new();
        while self.eat(&TokenKind::Pipe) {
            stages.push(self.parse_stage()?);
        }
        Ok(Statement::Pipeline(Pipeline { source, stages }))
    }

    fn parse_command(&mut self) -> Result<CommandInvocation, ShellError> {
        let position = self.position();
        let mut path = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::Slash => {
                    self.advance();
                    if path.is_empty() {
                        path.push(PathSegment::Root);
                    }
                }
                TokenKind::DotDot => {
                    self.advance();
                    path.push(PathSegment::Parent);
                }
                TokenKind::Minus if path.is_empty() => {
                    self.advance();
                    path.push(PathSegment::Previous);
                }
                TokenKind::Ident(name) if self.peek_at(1) != &TokenKind::Assign => {
                    // `name(` starts a call argument, not another word
                    if self.peek_at(1) == &TokenKind::LParen && self.adjacent() && !path.is_empty() {
                        break;
                    }
                    self.advance();
                    path.push(PathSegment::Name(name));
                }
                _ => break,
            }
        }
        if path.is_empty() {
            return Err(self.error("command"));
        }
        let args = self.parse_command_args()?;
        Ok(CommandInvocation {
            path,
            args,
            position,
        })
    }

    fn parse_command_args(&mut self) -> Result<Vec<CallArg>, ShellError> {
        let mut args = Vec::new();
        while !self.at_statement_end() {
            args.push(self.parse_command_arg()?);
        }
        Ok(args)
    }

    fn parse_command_arg(&mut self) -> Result<CallArg, ShellError> {
        if let (TokenKind::Ident(name), TokenKind::Assign) = (self.peek().clone(), self.peek_at(1).clone()) {
            self.advance();
            self.advance();
            let value = self.parse_arg_value()?;
            return Ok(CallArg::Named(name, value));
        }
        if let (TokenKind::Minus, TokenKind::Ident(word)) = (self.peek().clone(), self.peek_at(1).clone()) {
            if self.adjacent() {
                self.advance();
                self.advance();
                return Ok(CallArg::Positional(Expression::Literal(Value::String(
                    format!("-{}", word),
                ))));
            }
        }
        Ok(CallArg::Positional(self.parse_arg_value()?))
    }

    /// An argument value stops at whitespace-separated operators, so
    /// `name=tank size=10G` yields two arguments. A bare word is a string;
    /// parenthesize to use a variable or a full expression.
    fn parse_arg_value(&mut self) -> Result<Expression, ShellError> {
        if let TokenKind::Ident(word) = self.peek().clone() {
            if !matches!(self.peek_at(1), TokenKind::LParen) {
                self.advance();
                return Ok(Expression::Literal(Value::String(word)));
            }
        }
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_postfix()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_stage(&mut self) -> Result<Stage, ShellError> {
        let position = self.position();
        let name = self.expect_ident("pipeline stage")?;
        let predicate = name == "search" || name == "exclude";
        let args = if self.check(&TokenKind::LParen) {
            let args = self.parse_call_args()?;
            if predicate {
                args
            } else {
                args.into_iter().map(word_arg).collect()
            }
        } else if predicate {
            vec![CallArg::Positional(self.parse_expression()?)]
        } else {
            self.parse_command_args()?
        };
        Ok(Stage {
            name,
            args,
            position,
        })
    }

    fn parse_call_args(&mut self) -> Result<Vec<CallArg>, ShellError> {
        self.expect(&TokenKind::LParen, "'('")?;
        self.nesting += 1;
        let mut args = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::RParen) {
            loop {
                self.skip_newlines();
                if let (TokenKind::Ident(name), TokenKind::Assign) =
                    (self.peek().clone(), self.peek_at(1).clone())
                {
                    self.advance();
                    self.advance();
                    args.push(CallArg::Named(name, self.parse_expression()?));
                } else {
                    args.push(CallArg::Positional(self.parse_expression()?));
                }
                self.skip_newlines();
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        self.nesting -= 1;
        Ok(args)
    }

    /// Parse `/a/b.prop` or `.prop`; restores nothing on failure, the caller
    /// rewinds.
    fn try_property_path(&mut self) -> Option<PropertyPath> {
        let absolute = self.eat(&TokenKind::Slash);
        let mut segments = Vec::new();
        if absolute {
            loop {
                match self.peek().clone() {
                    TokenKind::Ident(name) => {
                        self.advance();
                        segments.push(name);
                        if !self.eat(&TokenKind::Slash) {
                            break;
                        }
                    }
                    _ => break,
                }
            }
        }
        if !self.eat(&TokenKind::Dot) {
            return None;
        }
        match self.peek().clone() {
            TokenKind::Ident(property) => {
                self.advance();
                Some(PropertyPath {
                    absolute,
                    segments,
                    property,
                })
            }
            _ => None,
        }
    }

    fn parse_expression(&mut self) -> Result<Expression, ShellError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, ShellError> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ShellError> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, ShellError> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<Expression, ShellError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expression, ShellError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::Le => BinOp::Le,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, ShellError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ShellError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ShellError> {
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ShellError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::LBracket => {
                    self.advance();
                    self.nesting += 1;
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    self.nesting -= 1;
                    expr = Expression::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident("member name after '.'")?;
                    expr = Expression::Member {
                        target: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ShellError> {
        let position = self.position();
        match self.peek().clone() {
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expression::Literal(Value::Int(i)))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expression::Literal(Value::Float(x)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Literal(Value::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Literal(Value::Bool(false)))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expression::Literal(Value::Null))
            }
            TokenKind::Str(parts) => {
                self.advance();
                self.string_literal(parts)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    Ok(Expression::FunctionCall(FunctionCall {
                        name,
                        args,
                        position,
                    }))
                } else {
                    Ok(Expression::Identifier(name))
                }
            }
            TokenKind::LParen => {
                self.advance();
                self.nesting += 1;
                self.skip_newlines();
                let expr = self.parse_expression()?;
                self.skip_newlines();
                self.expect(&TokenKind::RParen, "')'")?;
                self.nesting -= 1;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_dict(),
            TokenKind::DollarBrace => {
                self.advance();
                self.nesting += 1;
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RBrace, "'}'")?;
                self.nesting -= 1;
                Ok(expr)
            }
            TokenKind::DollarParen => {
                self.advance();
                self.nesting += 1;
                let stmt = self.parse_command_statement()?;
                self.expect(&TokenKind::RParen, "')'")?;
                self.nesting -= 1;
                Ok(Expression::Substitution(Box::new(stmt)))
            }
            TokenKind::Slash | TokenKind::Dot => {
                let start = self.pos;
                match self.try_property_path() {
                    Some(path) => Ok(Expression::PropertyPath(path)),
                    None => {
                        self.pos = start;
                        Err(self.error("property path"))
                    }
                }
            }
            _ => Err(self.error("expression")),
        }
    }

    fn parse_list(&mut self) -> Result<Expression, ShellError> {
        self.advance();
        self.nesting += 1;
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_expression()?);
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.skip_newlines();
        self.expect(&TokenKind::RBracket, "',' or ']'")?;
        self.nesting -= 1;
        Ok(Expression::List(items))
    }

    fn parse_dict(&mut self) -> Result<Expression, ShellError> {
        self.advance();
        self.nesting += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::RBrace) {
                break;
            }
            let key = match (self.peek().clone(), self.peek_at(1).clone()) {
                (TokenKind::Ident(name), TokenKind::Colon) => {
                    self.advance();
                    Expression::Literal(Value::String(name))
                }
                _ => self.parse_expression()?,
            };
            self.expect(&TokenKind::Colon, "':' after dict key")?;
            self.skip_newlines();
            let value = self.parse_expression()?;
            entries.push((key, value));
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.skip_newlines();
        self.expect(&TokenKind::RBrace, "',' or '}'")?;
        self.nesting -= 1;
        Ok(Expression::Dict(entries))
    }

    fn string_literal(&self, parts: Vec<StrPart>) -> Result<Expression, ShellError> {
        if let [StrPart::Text(text)] = parts.as_slice() {
            return Ok(Expression::Literal(Value::String(text.clone())));
        }
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StrPart::Text(text) => pieces.push(StringPiece::Text(text)),
                StrPart::Expr { source, position } => {
                    let mut inner = Parser::new(tokenize_at(&source, position)?);
                    let expr = inner.parse_expression()?;
                    if !inner.check(&TokenKind::Eof) {
                        return Err(inner.error("'}' closing interpolation"));
                    }
                    pieces.push(StringPiece::Expr(expr));
                }
            }
        }
        Ok(Expression::Interpolated(pieces))
    }
}

/// Column names in `sort(name, -size)` are words, not variables.
fn word_arg(arg: CallArg) -> CallArg {
    fn word(expr: Expression) -> Expression {
        match expr {
            Expression::Identifier(name) => Expression::Literal(Value::String(name)),
            Expression::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match *operand {
                Expression::Identifier(name) => {
                    Expression::Literal(Value::String(format!("-{}", name)))
                }
                other => Expression::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(other),
                },
            },
            other => other,
        }
    }
    match arg {
        CallArg::Positional(expr) => CallArg::Positional(word(expr)),
        CallArg::Named(name, expr) => CallArg::Named(name, word(expr)),
    }
}

fn binary(op: BinOp, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Turn `a[1]["k"]` / `a.k` into an assignment target rooted at a variable.
fn subscript_target(expr: Expression) -> Option<AssignTarget> {
    let mut keys = Vec::new();
    let mut current = expr;
    loop {
        match current {
            Expression::Index { target, index } => {
                keys.push(*index);
                current = *target;
            }
            Expression::Member { target, name } => {
                keys.push(Expression::Literal(Value::String(name)));
                current = *target;
            }
            Expression::Identifier(name) if !keys.is_empty() => {
                keys.reverse();
                return Some(AssignTarget::Subscript { name, keys });
            }
            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> Statement {
        let mut script = parse(source).unwrap();
        assert_eq!(script.statements.len(), 1, "expected one statement");
        script.statements.remove(0)
    }

    #[test]
    fn test_parse_assignment_precedence() {
        match single("a = 1 + 2 * 3") {
            Statement::Assignment {
                target: AssignTarget::Variable(name),
                value: Expression::Binary { op, right, .. },
            } => {
                assert_eq!(name, "a");
                assert_eq!(op, BinOp::Add);
                assert!(matches!(*right, Expression::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_logical_precedence() {
        // not binds looser than ==, and tighter than and
        match single("r = not a == b and c") {
            Statement::Assignment {
                value: Expression::Binary { op: BinOp::And, left, .. },
                ..
            } => match *left {
                Expression::Unary { op: UnaryOp::Not, operand } => {
                    assert!(matches!(*operand, Expression::Binary { op: BinOp::Eq, .. }));
                }
                other => panic!("Expected not, got {:?}", other),
            },
            other => panic!("Expected and, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_expression_rejected() {
        let err = parse("2*3").unwrap_err();
        match err {
            ShellError::Parse { expected, token, .. } => {
                assert_eq!(expected, "assignment, function call or command");
                assert_eq!(token, "number 2");
            }
            other => panic!("Expected parse error, got {:?}", other),
        }
        assert!(parse("a = 2*3").is_ok());
        assert!(parse("a[0]").is_err());
        assert!(parse("print(1) + 1").is_err());
    }

    #[test]
    fn test_bare_identifier_is_command() {
        match single("var") {
            Statement::Command(cmd) => {
                assert_eq!(cmd.path, vec![PathSegment::Name("var".into())]);
                assert!(cmd.args.is_empty());
            }
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_call_statement() {
        match single("print(a, 'x', sep=1)") {
            Statement::Expression(Expression::FunctionCall(call)) => {
                assert_eq!(call.name, "print");
                assert_eq!(call.args.len(), 3);
                assert!(matches!(&call.args[2], CallArg::Named(n, _) if n == "sep"));
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_command_with_path_and_args() {
        match single("/ storage volume create name=tank size=10G 3") {
            Statement::Command(cmd) => {
                assert_eq!(
                    cmd.path,
                    vec![
                        PathSegment::Root,
                        PathSegment::Name("storage".into()),
                        PathSegment::Name("volume".into()),
                        PathSegment::Name("create".into()),
                    ]
                );
                assert_eq!(cmd.args.len(), 3);
                match &cmd.args[0] {
                    CallArg::Named(name, Expression::Literal(Value::String(word))) => {
                        assert_eq!(name, "name");
                        assert_eq!(word, "tank");
                    }
                    other => panic!("Expected named word, got {:?}", other),
                }
                assert!(matches!(
                    &cmd.args[2],
                    CallArg::Positional(Expression::Literal(Value::Int(3)))
                ));
            }
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_navigation_segments() {
        match single("- ") {
            Statement::Command(cmd) => assert_eq!(cmd.path, vec![PathSegment::Previous]),
            other => panic!("Expected command, got {:?}", other),
        }
        match single(".. .. network") {
            Statement::Command(cmd) => assert_eq!(
                cmd.path,
                vec![
                    PathSegment::Parent,
                    PathSegment::Parent,
                    PathSegment::Name("network".into())
                ]
            ),
            other => panic!("Expected command, got {:?}", other),
        }
        match single("/account/user") {
            Statement::Command(cmd) => assert_eq!(cmd.path.len(), 3),
            other => panic!("Expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_stages() {
        match single("volume show | sort(name, -size) | limit 2 | search size > 10") {
            Statement::Pipeline(p) => {
                assert_eq!(p.source.path.len(), 2);
                let names: Vec<_> = p.stages.iter().map(|s| s.name.as_str()).collect();
                assert_eq!(names, vec!["sort", "limit", "search"]);
                assert_eq!(
                    p.stages[0].args,
                    vec![
                        CallArg::Positional(Expression::Literal(Value::from("name"))),
                        CallArg::Positional(Expression::Literal(Value::from("-size"))),
                    ]
                );
                assert!(matches!(
                    &p.stages[2].args[0],
                    CallArg::Positional(Expression::Binary { op: BinOp::Gt, .. })
                ));
            }
            other => panic!("Expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_dash_word_argument() {
        match single("volume show | sort -size") {
            Statement::Pipeline(p) => assert_eq!(
                p.stages[0].args,
                vec![CallArg::Positional(Expression::Literal(Value::from("-size")))]
            ),
            other => panic!("Expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_c_style_for() {
        match single("for (i = 0; i < 3; i = i + 1) { print(i) }") {
            Statement::ForLoop {
                init,
                condition,
                step,
                body,
            } => {
                assert!(init.is_some());
                assert!(condition.is_some());
                assert!(step.is_some());
                assert_eq!(body.len(), 1);
            }
            other => panic!("Expected for loop, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_in_and_while() {
        assert!(matches!(
            single("for (x in [1, 2]) { print(x) }"),
            Statement::ForIn { .. }
        ));
        assert!(matches!(
            single("while (true) { break }"),
            Statement::While { .. }
        ));
    }

    #[test]
    fn test_parse_if_else_chain() {
        let stmt = single("if (a > 1) { print(1) }\nelse if (a == 1) { print(2) } else { print(3) }");
        match stmt {
            Statement::Conditional {
                else_block: Some(else_block),
                ..
            } => match &else_block[0] {
                Statement::Conditional { else_block, .. } => assert!(else_block.is_some()),
                other => panic!("Expected nested if, got {:?}", other),
            },
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_dict_and_index() {
        match single(r#"b = {"this": "foo", that: "bar"}"#) {
            Statement::Assignment {
                value: Expression::Dict(entries),
                ..
            } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].0, Expression::Literal(Value::from("that")));
            }
            other => panic!("Expected dict, got {:?}", other),
        }
        assert!(matches!(
            single(r#"x = b["this"]"#),
            Statement::Assignment {
                value: Expression::Index { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_parse_subscript_assignment() {
        match single("a[0].name = 1") {
            Statement::Assignment {
                target: AssignTarget::Subscript { name, keys },
                ..
            } => {
                assert_eq!(name, "a");
                assert_eq!(keys.len(), 2);
            }
            other => panic!("Expected subscript assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_property_paths() {
        match single("/system/general.hostname = 'nas'") {
            Statement::Assignment {
                target: AssignTarget::Property(path),
                ..
            } => {
                assert!(path.absolute);
                assert_eq!(path.segments, vec!["system", "general"]);
                assert_eq!(path.property, "hostname");
            }
            other => panic!("Expected property assignment, got {:?}", other),
        }
        match single("h = .hostname") {
            Statement::Assignment {
                value: Expression::PropertyPath(path),
                ..
            } => {
                assert!(!path.absolute);
                assert_eq!(path.property, "hostname");
            }
            other => panic!("Expected property read, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_interpolated_string() {
        match single(r#"s = "n=${n + 1}""#) {
            Statement::Assignment {
                value: Expression::Interpolated(pieces),
                ..
            } => {
                assert_eq!(pieces.len(), 2);
                assert!(matches!(pieces[1], StringPiece::Expr(Expression::Binary { .. })));
            }
            other => panic!("Expected interpolation, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolation_error_points_into_string() {
        match parse(r#"s = "abc ${1 +}""#) {
            Err(ShellError::Parse { position, .. }) => assert_eq!(position.column, 15),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_substitution() {
        match single("rows = $(volume show | limit 1)") {
            Statement::Assignment {
                value: Expression::Substitution(stmt),
                ..
            } => assert!(matches!(*stmt, Statement::Pipeline(_))),
            other => panic!("Expected substitution, got {:?}", other),
        }
    }

    #[test]
    fn test_multiple_statements() {
        let script = parse("a = 1; b = 2\nprint(a)").unwrap();
        assert_eq!(script.statements.len(), 3);
    }

    #[test]
    fn test_incomplete_block() {
        let err = parse("for (i = 0; i < 3; i = i + 1) {\n print(i)").unwrap_err();
        assert!(err.is_incomplete());
        let err = parse("a = ").unwrap_err();
        assert!(!err.is_incomplete());
    }

    #[test]
    fn test_parse_function_definition() {
        let source = "function area(w, h)\n{\n  if w < 0 { return }\n  return w * h\n}";
        match single(source) {
            Statement::Function(def) => {
                assert_eq!(def.name, "area");
                assert_eq!(def.params, vec!["w", "h"]);
                assert_eq!(def.position, Position::new(1, 1, 0));
                assert_eq!(def.body.len(), 2);
                match &def.body[0] {
                    Statement::Conditional { then_block, .. } => {
                        assert_eq!(then_block, &vec![Statement::Return(None)])
                    }
                    other => panic!("Expected conditional, got {:?}", other),
                }
                assert!(matches!(
                    &def.body[1],
                    Statement::Return(Some(Expression::Binary { op: BinOp::Mul, .. }))
                ));
            }
            other => panic!("Expected function definition, got {:?}", other),
        }
        match single("function noop() {}") {
            Statement::Function(def) => {
                assert!(def.params.is_empty());
                assert!(def.body.is_empty());
            }
            other => panic!("Expected function definition, got {:?}", other),
        }
    }

    #[test]
    fn test_return_only_inside_functions() {
        let err = parse("return 1").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
        assert!(parse("while true { return }").is_err());
        assert!(parse("function f() { while true { return 1 } }").is_ok());
        // the body of a nested definition still counts
        assert!(parse("function f() { function g() { return } }; return").is_err());
    }

    #[test]
    fn test_parse_function_errors() {
        assert!(parse("function (a) {}").is_err());
        assert!(parse("function f(a, a) {}").is_err());
        assert!(parse("function f(a,) {}").is_err());
        assert!(parse("function f(1) {}").is_err());
        let err = parse("function f(a) {\n return a").unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_parse_undef() {
        assert_eq!(single("undef x"), Statement::Undef("x".into()));
        assert!(parse("undef").is_err());
        assert!(parse("undef 3").is_err());
    }

    #[test]
    fn test_parse_error_reports_found_token() {
        match parse("a = (1 + 2") {
            Err(ShellError::Parse {
                token, expected, ..
            }) => {
                assert_eq!(token, "end of input");
                assert_eq!(expected, "')'");
            }
            other => panic!("Expected parse error, got {:?}", other),
        }
    }
}
