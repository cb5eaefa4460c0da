use super::node::Stmt;

/// An analyzed `tiny` program, ready for compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Top-level statements in source order.
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}
