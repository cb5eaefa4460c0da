use crate::lang::token::{Position, Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A node the compiler does not know how to lower. The analyzer should
    /// have rejected the program before it got here.
    #[error("compile error: cannot compile '{lexeme}' ({kind}) at {position}")]
    Unhandled {
        lexeme: String,
        kind: TokenKind,
        position: Position,
    },

    #[error("compile error: invalid {kind} literal '{lexeme}' at {position}")]
    InvalidLiteral {
        lexeme: String,
        kind: TokenKind,
        position: Position,
    },

    /// A node that is valid but appeared where it cannot run.
    #[error("compile error: '{lexeme}' at {position}: {reason}")]
    InvalidPosition {
        lexeme: String,
        kind: TokenKind,
        position: Position,
        reason: &'static str,
    },

    #[error("compile error: {what} exceeds the limit of {limit}")]
    LimitExceeded { what: &'static str, limit: usize },
}

impl CompileError {
    pub fn unhandled(token: &Token) -> Self {
        CompileError::Unhandled {
            lexeme: token.lexeme.clone(),
            kind: token.kind,
            position: token.position,
        }
    }

    pub fn invalid_literal(token: &Token) -> Self {
        CompileError::InvalidLiteral {
            lexeme: token.lexeme.clone(),
            kind: token.kind,
            position: token.position,
        }
    }

    pub fn invalid_position(token: &Token, reason: &'static str) -> Self {
        CompileError::InvalidPosition {
            lexeme: token.lexeme.clone(),
            kind: token.kind,
            position: token.position,
            reason,
        }
    }

    pub fn limit(what: &'static str) -> Self {
        CompileError::LimitExceeded {
            what,
            limit: u16::MAX as usize,
        }
    }
}
