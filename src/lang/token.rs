use serde::{Deserialize, Serialize};

/// Source position carried from the parser through to runtime diagnostics.
///
/// `line` and `column` are 1-based. A zero line means "unknown", which is
/// what synthetic tokens built by hand (tests, embedders) carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // literals
    Int,
    Float,
    Bool,
    String,
    Unit,

    Identifier,

    // keywords that anchor statements
    Let,
    Var,
    Fn,
    If,
    Else,
    While,
    Return,
    Print,
    Break,
    Continue,

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    EqualEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,

    OpenCurly,
    OpenParen,
    OpenSquare,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Int => "int",
            TokenKind::Float => "float",
            TokenKind::Bool => "bool",
            TokenKind::String => "string",
            TokenKind::Unit => "unit",
            TokenKind::Identifier => "identifier",
            TokenKind::Let => "let",
            TokenKind::Var => "var",
            TokenKind::Fn => "function",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Return => "return",
            TokenKind::Print => "print",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Bang => "!",
            TokenKind::Equal => "=",
            TokenKind::PlusEqual => "+=",
            TokenKind::MinusEqual => "-=",
            TokenKind::StarEqual => "*=",
            TokenKind::SlashEqual => "/=",
            TokenKind::EqualEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::OpenCurly => "{",
            TokenKind::OpenParen => "(",
            TokenKind::OpenSquare => "[",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A lexed token as handed over by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            position: Position::new(line, column),
        }
    }

    /// A token with no source position, for trees built outside the parser.
    pub fn synthetic(kind: TokenKind, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            position: Position::default(),
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.position = Position::new(line, column);
        self
    }
}
