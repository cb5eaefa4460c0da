use super::token::TokenKind;

/// Binary operators understood by the compiler and the value model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // comparison
    Less,
    LessEq,
    Greater,
    GreaterEq,
    EqEq,
    NotEq,

    // logic (short-circuiting, lowered to jumps)
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::EqEq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    pub fn from_token(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::Plus | TokenKind::PlusEqual => BinaryOp::Add,
            TokenKind::Minus | TokenKind::MinusEqual => BinaryOp::Sub,
            TokenKind::Star | TokenKind::StarEqual => BinaryOp::Mul,
            TokenKind::Slash | TokenKind::SlashEqual => BinaryOp::Div,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEq,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEq,
            TokenKind::EqualEqual => BinaryOp::EqEq,
            TokenKind::NotEqual => BinaryOp::NotEq,
            TokenKind::And => BinaryOp::And,
            TokenKind::Or => BinaryOp::Or,
            _ => return None,
        })
    }

    /// Token kind a synthetic operator token is built with.
    pub fn token_kind(&self) -> TokenKind {
        match self {
            BinaryOp::Add => TokenKind::Plus,
            BinaryOp::Sub => TokenKind::Minus,
            BinaryOp::Mul => TokenKind::Star,
            BinaryOp::Div => TokenKind::Slash,
            BinaryOp::Less => TokenKind::Less,
            BinaryOp::LessEq => TokenKind::LessEqual,
            BinaryOp::Greater => TokenKind::Greater,
            BinaryOp::GreaterEq => TokenKind::GreaterEqual,
            BinaryOp::EqEq => TokenKind::EqualEqual,
            BinaryOp::NotEq => TokenKind::NotEqual,
            BinaryOp::And => TokenKind::And,
            BinaryOp::Or => TokenKind::Or,
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
        }
    }
}
