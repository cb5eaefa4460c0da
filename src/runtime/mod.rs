pub mod config;
pub mod debugger;
pub mod frame;
pub mod output;
pub mod runtime_error;
pub mod vm;

pub use config::VmConfig;
pub use debugger::{StepCommand, StepDebugger};
pub use frame::Frame;
pub use output::OutputBuffer;
pub use runtime_error::{RuntimeError, RuntimeErrorKind};
pub use vm::{ExecStats, Vm};
