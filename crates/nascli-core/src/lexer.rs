//! Tokenizer for shell input.
//!
//! Converts one line (or a whole script) into a flat token sequence. Strings
//! are split into literal text and `${expr}` parts here; the embedded
//! expressions are tokenized again by the parser using the recorded position
//! so errors point into the original text.

use std::fmt;

use crate::error::{Position, ShellError};

/// Piece of a quoted string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Text(String),
    /// Source of an `${...}` marker and the position of its first character.
    Expr { source: String, position: Position },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(Vec<StrPart>),
    // Keywords
    For,
    In,
    If,
    Else,
    While,
    Break,
    Function,
    Return,
    Undef,
    And,
    Or,
    Not,
    True,
    False,
    None,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
    Assign,
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    DotDot,
    Pipe,
    Semicolon,
    Newline,
    /// `${`
    DollarBrace,
    /// `$(`
    DollarParen,
    Eof,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "break" => TokenKind::Break,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "undef" => TokenKind::Undef,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "none" | "null" => TokenKind::None,
            _ => return None,
        })
    }

    /// Words reserved by the language, offered by completion.
    pub const KEYWORDS: &'static [&'static str] = &[
        "and", "break", "else", "false", "for", "function", "if", "in", "none", "not", "or",
        "return", "true", "undef", "while",
    ];
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Int(i) => write!(f, "number {}", i),
            TokenKind::Float(x) => write!(f, "number {}", x),
            TokenKind::Str(_) => f.write_str("string"),
            TokenKind::Newline => f.write_str("end of line"),
            TokenKind::Eof => f.write_str("end of input"),
            other => {
                let text = match other {
                    TokenKind::For => "for",
                    TokenKind::In => "in",
                    TokenKind::If => "if",
                    TokenKind::Else => "else",
                    TokenKind::While => "while",
                    TokenKind::Break => "break",
                    TokenKind::Function => "function",
                    TokenKind::Return => "return",
                    TokenKind::Undef => "undef",
                    TokenKind::And => "and",
                    TokenKind::Or => "or",
                    TokenKind::Not => "not",
                    TokenKind::True => "true",
                    TokenKind::False => "false",
                    TokenKind::None => "none",
                    TokenKind::Plus => "+",
                    TokenKind::Minus => "-",
                    TokenKind::Star => "*",
                    TokenKind::Slash => "/",
                    TokenKind::Percent => "%",
                    TokenKind::EqEq => "==",
                    TokenKind::NotEq => "!=",
                    TokenKind::Gt => ">",
                    TokenKind::Lt => "<",
                    TokenKind::Ge => ">=",
                    TokenKind::Le => "<=",
                    TokenKind::Assign => "=",
                    TokenKind::LParen => "(",
                    TokenKind::RParen => ")",
                    TokenKind::LBracket => "[",
                    TokenKind::RBracket => "]",
                    TokenKind::LBrace => "{",
                    TokenKind::RBrace => "}",
                    TokenKind::Comma => ",",
                    TokenKind::Colon => ":",
                    TokenKind::Dot => ".",
                    TokenKind::DotDot => "..",
                    TokenKind::Pipe => "|",
                    TokenKind::Semicolon => ";",
                    TokenKind::DollarBrace => "${",
                    TokenKind::DollarParen => "$(",
                    _ => "?",
                };
                write!(f, "'{}'", text)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text of the token.
    pub literal: String,
    pub position: Position,
}

/// Tokenize `source` starting at line 1, column 1.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ShellError> {
    tokenize_at(source, Position::new(1, 1, 0))
}

/// Tokenize a fragment whose first character sits at `start` in some larger
/// input.
pub fn tokenize_at(source: &str, start: Position) -> Result<Vec<Token>, ShellError> {
    Lexer::new(source, start).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    base_offset: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str, start: Position) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: start.line,
            column: start.column,
            base_offset: start.offset,
            tokens: Vec::new(),
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.base_offset + self.pos)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn text_since(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn push(&mut self, kind: TokenKind, start: usize, position: Position) {
        let literal = self.text_since(start);
        self.tokens.push(Token {
            kind,
            literal,
            position,
        });
    }

    fn lex_error(&self, ch: char) -> ShellError {
        ShellError::Lex {
            position: self.position(),
            ch,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ShellError> {
        while let Some(ch) = self.peek() {
            let start = self.pos;
            let position = self.position();
            match ch {
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\n' => {
                    self.bump();
                    if self
                        .tokens
                        .last()
                        .map_or(true, |t| t.kind != TokenKind::Newline)
                    {
                        self.push(TokenKind::Newline, start, position);
                    }
                }
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '"' | '\'' => {
                    let parts = self.string(ch)?;
                    self.push(TokenKind::Str(parts), start, position);
                }
                c if c.is_ascii_digit() => {
                    let kind = self.number()?;
                    self.push(kind, start, position);
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let word = self.text_since(start);
                    let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Ident(word));
                    self.push(kind, start, position);
                }
                _ => {
                    let kind = self.operator(ch)?;
                    self.push(kind, start, position);
                }
            }
        }
        let position = self.position();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            literal: String::new(),
            position,
        });
        Ok(self.tokens)
    }

    fn operator(&mut self, ch: char) -> Result<TokenKind, ShellError> {
        let next = self.peek_at(1);
        let (kind, width) = match (ch, next) {
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('.', Some('.')) => (TokenKind::DotDot, 2),
            ('$', Some('{')) => (TokenKind::DollarBrace, 2),
            ('$', Some('(')) => (TokenKind::DollarParen, 2),
            ('=', _) => (TokenKind::Assign, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('|', _) => (TokenKind::Pipe, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            _ => return Err(self.lex_error(ch)),
        };
        for _ in 0..width {
            self.bump();
        }
        Ok(kind)
    }

    fn number(&mut self) -> Result<TokenKind, ShellError> {
        let start = self.pos;
        let position = self.position();

        if self.peek() == Some('0') {
            let radix = match self.peek_at(1).map(|c| c.to_ascii_lowercase()) {
                Some('x') => Some(16),
                Some('o') => Some(8),
                Some('b') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                if self.peek_at(2).map_or(false, |c| c.is_digit(radix)) {
                    self.bump();
                    self.bump();
                    let digits_start = self.pos;
                    while self.peek().map_or(false, |c| c.is_digit(radix)) {
                        self.bump();
                    }
                    let digits = self.text_since(digits_start);
                    return i64::from_str_radix(&digits, radix)
                        .map(TokenKind::Int)
                        .map_err(|_| too_large(position, self.text_since(start)));
                }
            }
        }

        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = matches!(self.peek_at(1), Some('+') | Some('-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).map_or(false, |c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..digit_at {
                    self.bump();
                }
                while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }

        let text = self.text_since(start);
        if is_float {
            return text
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| ShellError::Lex {
                    position,
                    ch: text.chars().next().unwrap_or('0'),
                });
        }

        let base: i64 = text.parse().map_err(|_| too_large(position, text))?;
        match self.size_suffix() {
            Some(multiplier) => base
                .checked_mul(multiplier)
                .map(TokenKind::Int)
                .ok_or_else(|| too_large(position, self.text_since(start))),
            None => Ok(TokenKind::Int(base)),
        }
    }

    /// Consume a `k`/`m`/`g`/`t`/`p` size suffix (with optional `i` and `b`)
    /// if one ends the number, returning its multiplier.
    fn size_suffix(&mut self) -> Option<i64> {
        let unit = self.peek()?.to_ascii_lowercase();
        let exponent = match unit {
            'k' => 1,
            'm' => 2,
            'g' => 3,
            't' => 4,
            'p' => 5,
            _ => return None,
        };
        let mut len = 1;
        if self.peek_at(len).map(|c| c.to_ascii_lowercase()) == Some('i') {
            len += 1;
        }
        if self.peek_at(len).map(|c| c.to_ascii_lowercase()) == Some('b') {
            len += 1;
        }
        if self
            .peek_at(len)
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            return None;
        }
        for _ in 0..len {
            self.bump();
        }
        Some(1024i64.pow(exponent))
    }

    fn string(&mut self, quote: char) -> Result<Vec<StrPart>, ShellError> {
        let open = self.position();
        self.bump();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ShellError::Lex {
                        position: open,
                        ch: quote,
                    })
                }
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(c @ ('\\' | '"' | '\'' | '$')) => text.push(c),
                        Some(c) => {
                            text.push('\\');
                            text.push(c);
                        }
                        None => {
                            return Err(ShellError::Lex {
                                position: open,
                                ch: quote,
                            })
                        }
                    }
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    let marker = self.position();
                    self.bump();
                    self.bump();
                    let position = self.position();
                    let source = self.interpolation_body(marker)?;
                    if !text.is_empty() {
                        parts.push(StrPart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(StrPart::Expr { source, position });
                }
                Some(_) => {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(StrPart::Text(text));
        }
        Ok(parts)
    }

    /// Collect the raw text of an `${...}` marker up to its matching brace.
    fn interpolation_body(&mut self, marker: Position) -> Result<String, ShellError> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.peek() else {
                return Err(ShellError::Lex {
                    position: marker,
                    ch: '$',
                });
            };
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), '\\') => {
                    self.bump();
                }
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '{') => depth += 1,
                (None, '}') if depth == 0 => break,
                (None, '}') => depth -= 1,
                (None, _) => {}
            }
            self.bump();
        }
        let source = self.text_since(start);
        self.bump();
        Ok(source)
    }
}

fn too_large(position: Position, text: String) -> ShellError {
    ShellError::LiteralTooLarge { position, text }
}
