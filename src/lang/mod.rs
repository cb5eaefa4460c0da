//! # tiny language model
//!
//! The tree handed over by the parser and analyzer, and the runtime values
//! shared by the compiler (constant pool) and the VM (operand stack).
//!
//! ## Conventions
//!
//! - Every node carries its source [`Token`](token::Token) so compile and
//!   runtime errors can name the lexeme and position.
//! - Literal values stay as lexemes in the tree; the compiler parses them.

pub mod node;
pub mod operator;
pub mod program;
pub mod token;
pub mod value;
