use super::operator::{BinaryOp, UnaryOp};
use super::token::{Token, TokenKind};

/// Statement node of a `tiny` program.
///
/// Every node carries the token it was parsed from so diagnostics can name
/// the offending lexeme and position.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    // ───────────────────────────── Expressions ──────────────────────────
    /// Evaluate an expression and discard its value.
    Expr(Expr),

    // ──────────────────────────── Declarations ──────────────────────────
    /// `let name = init;` / `var name = init;`
    VarDecl(VarDecl),

    /// `fn name(params) { body }`
    FnDef(FnDef),

    // ──────────────────────────── Control flow ──────────────────────────
    /// `{ ... }`
    Block(Block),

    /// `if [decl;] cond { ... } [else ...]`
    If(IfStmt),

    /// `while [decl;] cond [; increment] { ... }`
    While(WhileStmt),

    /// `return [value];`
    Return { token: Token, value: Option<Expr> },

    Break(Token),

    Continue(Token),

    // ─────────────────────────────── I/O ────────────────────────────────
    /// `print(a, b, ...);`
    Print { token: Token, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    /// The `let` / `var` keyword.
    pub token: Token,
    pub name: Token,
    /// `var` declarations are mutable; mutability is enforced upstream.
    pub mutable: bool,
    pub init: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub token: Token,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub token: Token,
    /// Declaration visible in the condition and both branches only.
    pub decl: Option<VarDecl>,
    pub cond: Expr,
    pub then_branch: Block,
    /// Either a `Stmt::Block` or another `Stmt::If` (`else if`).
    pub else_branch: Option<Box<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub token: Token,
    pub decl: Option<VarDecl>,
    pub cond: Expr,
    /// Evaluated after each iteration, including after `continue`.
    pub increment: Option<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub token: Token,
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Block,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal whose value is parsed from the token lexeme at compile time.
    Literal(Token),

    /// `[a, b, c]`
    List { token: Token, items: Vec<Expr> },

    Identifier(Token),

    /// `target = value` or compound `target op= value`. Evaluates to the
    /// assigned value.
    Assign {
        token: Token,
        target: Token,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },

    Binary {
        token: Token,
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Unary {
        token: Token,
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// `callee(args...)`
    Call {
        token: Token,
        callee: Token,
        args: Vec<Expr>,
    },

    /// `fn(params) { body }`, evaluating to the function value.
    AnonFn {
        token: Token,
        params: Vec<Token>,
        body: Block,
    },
}

impl Expr {
    pub fn token(&self) -> &Token {
        match self {
            Expr::Literal(token) | Expr::Identifier(token) => token,
            Expr::List { token, .. }
            | Expr::Assign { token, .. }
            | Expr::Binary { token, .. }
            | Expr::Unary { token, .. }
            | Expr::Call { token, .. }
            | Expr::AnonFn { token, .. } => token,
        }
    }

    // ─────────────────────────── Tree builders ──────────────────────────

    pub fn int(n: i32) -> Self {
        Expr::Literal(Token::synthetic(TokenKind::Int, n.to_string()))
    }

    pub fn float(n: f32) -> Self {
        Expr::Literal(Token::synthetic(TokenKind::Float, n.to_string()))
    }

    pub fn boolean(b: bool) -> Self {
        Expr::Literal(Token::synthetic(TokenKind::Bool, b.to_string()))
    }

    /// String literal; the lexeme is the unquoted text.
    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Token::synthetic(TokenKind::String, s))
    }

    pub fn unit() -> Self {
        Expr::Literal(Token::synthetic(TokenKind::Unit, "()"))
    }

    pub fn list(items: Vec<Expr>) -> Self {
        Expr::List {
            token: Token::synthetic(TokenKind::OpenSquare, "["),
            items,
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Identifier(Token::synthetic(TokenKind::Identifier, name))
    }

    /// Assignment whose operator comes from the `=` / `op=` token.
    pub fn assignment(token: Token, target: Token, value: Expr) -> Self {
        let op = BinaryOp::from_token(token.kind).filter(BinaryOp::is_arithmetic);
        Expr::Assign {
            token,
            target,
            op,
            value: Box::new(value),
        }
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Expr::assignment(
            Token::synthetic(TokenKind::Equal, "="),
            Token::synthetic(TokenKind::Identifier, name),
            value,
        )
    }

    /// `name op= value`; `op` must be arithmetic.
    pub fn compound(op: BinaryOp, name: impl Into<String>, value: Expr) -> Self {
        let kind = match op {
            BinaryOp::Sub => TokenKind::MinusEqual,
            BinaryOp::Mul => TokenKind::StarEqual,
            BinaryOp::Div => TokenKind::SlashEqual,
            _ => TokenKind::PlusEqual,
        };
        Expr::assignment(
            Token::synthetic(kind, kind.name()),
            Token::synthetic(TokenKind::Identifier, name),
            value,
        )
    }

    pub fn anon_fn(params: &[&str], body: Vec<Stmt>) -> Self {
        Expr::AnonFn {
            token: Token::synthetic(TokenKind::Fn, "fn"),
            params: params
                .iter()
                .map(|p| Token::synthetic(TokenKind::Identifier, *p))
                .collect(),
            body: Block::new(body),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            token: Token::synthetic(op.token_kind(), op.symbol()),
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let kind = match op {
            UnaryOp::Negate => TokenKind::Minus,
            UnaryOp::Not => TokenKind::Bang,
        };
        Expr::Unary {
            token: Token::synthetic(kind, op.symbol()),
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            token: Token::synthetic(TokenKind::OpenParen, "("),
            callee: Token::synthetic(TokenKind::Identifier, name),
            args,
        }
    }
}

impl Stmt {
    pub fn token(&self) -> &Token {
        match self {
            Stmt::Expr(expr) => expr.token(),
            Stmt::VarDecl(decl) => &decl.token,
            Stmt::FnDef(def) => &def.token,
            Stmt::Block(block) => &block.token,
            Stmt::If(stmt) => &stmt.token,
            Stmt::While(stmt) => &stmt.token,
            Stmt::Return { token, .. } | Stmt::Print { token, .. } => token,
            Stmt::Break(token) | Stmt::Continue(token) => token,
        }
    }

    // ─────────────────────────── Tree builders ──────────────────────────

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr(expr)
    }

    pub fn let_decl(name: impl Into<String>, init: Expr) -> Self {
        Stmt::VarDecl(VarDecl::new(name, false, init))
    }

    pub fn var_decl(name: impl Into<String>, init: Expr) -> Self {
        Stmt::VarDecl(VarDecl::new(name, true, init))
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Stmt::Block(Block::new(stmts))
    }

    pub fn if_else(cond: Expr, then_branch: Vec<Stmt>, else_branch: Option<Stmt>) -> Self {
        Stmt::If(IfStmt {
            token: Token::synthetic(TokenKind::If, "if"),
            decl: None,
            cond,
            then_branch: Block::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While(WhileStmt {
            token: Token::synthetic(TokenKind::While, "while"),
            decl: None,
            cond,
            increment: None,
            body: Block::new(body),
        })
    }

    /// `while decl; cond; increment { body }`
    pub fn for_loop(decl: Option<VarDecl>, cond: Expr, increment: Option<Expr>, body: Vec<Stmt>) -> Self {
        Stmt::While(WhileStmt {
            token: Token::synthetic(TokenKind::While, "while"),
            decl,
            cond,
            increment,
            body: Block::new(body),
        })
    }

    pub fn function(name: impl Into<String>, params: &[&str], body: Vec<Stmt>) -> Self {
        Stmt::FnDef(FnDef {
            token: Token::synthetic(TokenKind::Fn, "fn"),
            name: Token::synthetic(TokenKind::Identifier, name),
            params: params
                .iter()
                .map(|p| Token::synthetic(TokenKind::Identifier, *p))
                .collect(),
            body: Block::new(body),
        })
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return {
            token: Token::synthetic(TokenKind::Return, "return"),
            value,
        }
    }

    pub fn print(args: Vec<Expr>) -> Self {
        Stmt::Print {
            token: Token::synthetic(TokenKind::Print, "print"),
            args,
        }
    }

    pub fn brk() -> Self {
        Stmt::Break(Token::synthetic(TokenKind::Break, "break"))
    }

    pub fn cont() -> Self {
        Stmt::Continue(Token::synthetic(TokenKind::Continue, "continue"))
    }
}

impl VarDecl {
    pub fn new(name: impl Into<String>, mutable: bool, init: Expr) -> Self {
        let (kind, keyword) = if mutable {
            (TokenKind::Var, "var")
        } else {
            (TokenKind::Let, "let")
        };
        Self {
            token: Token::synthetic(kind, keyword),
            name: Token::synthetic(TokenKind::Identifier, name),
            mutable,
            init,
        }
    }
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self {
            token: Token::synthetic(TokenKind::OpenCurly, "{"),
            stmts,
        }
    }
}
