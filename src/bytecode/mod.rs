pub mod chunk;
pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod format;
pub mod op;
pub mod verify;

pub use chunk::{Chunk, Instruction};
pub use compile::{Compiler, compile};
pub use compile_error::CompileError;
pub use format::FormatError;
pub use op::Op;
pub use verify::{VerifyError, verify};
