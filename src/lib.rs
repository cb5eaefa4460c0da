//! # tiny
//!
//! Bytecode back end for the tiny scripting language: a single-pass
//! compiler from an analyzed syntax tree to a [`Chunk`], and a stack VM that
//! executes it.
//!
//! ```text
//! Program --compile--> Chunk --verify--> Vm::run
//!                        |
//!                        +--to_bytes/from_bytes--> .tbc file
//! ```

pub mod bytecode;
pub mod lang;
pub mod runtime;

pub use bytecode::{Chunk, CompileError, FormatError, VerifyError, compile};
pub use lang::program::Program;
pub use lang::value::Value;
pub use runtime::{RuntimeError, Vm, VmConfig};

use thiserror::Error;

/// Any failure along the compile, load and run pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Compile `program` and run it on `vm`, returning the chunk that ran.
pub fn run(program: &Program, vm: &mut Vm) -> Result<Chunk, Error> {
    let chunk = compile(program)?;
    vm.run(&chunk)?;
    Ok(chunk)
}
