use crate::bytecode::VerifyError;
use crate::lang::token::Position;
use crate::lang::value::ValueError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("invalid bytecode: {0}")]
    Verify(#[from] VerifyError),

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("'{name}' is not callable (found {found})")]
    NotCallable { name: String, found: &'static str },

    #[error("function '{name}' expected {expected} argument(s) but received {got}")]
    WrongArity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("condition must be bool, found {0}")]
    ConditionNotBool(&'static str),

    #[error("stack overflow (limit {0})")]
    StackOverflow(usize),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("call depth limit exceeded ({0}), possible infinite recursion")]
    CallDepthExceeded(usize),

    #[error("scope depth limit exceeded ({0})")]
    ScopeDepthExceeded(usize),

    #[error("scope underflow")]
    ScopeUnderflow,

    #[error("frame underflow: return outside of a function")]
    FrameUnderflow,

    #[error("local slot {0} is outside the current frame")]
    BadSlot(usize),

    #[error("instruction pointer {0} is out of bounds")]
    IpOutOfBounds(usize),

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("native function '{name}' failed: {message}")]
    Native { name: String, message: String },

    #[error("output error: {0}")]
    Output(String),
}

/// Frames shown at each end of a long call stack.
const CALL_STACK_EDGE: usize = 10;

/// A fatal error raised while executing a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    /// Offset of the failing instruction, when execution had started.
    pub ip: Option<usize>,
    pub position: Position,
    /// Function names, outermost first.
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.kind)?;

        if let Some(ip) = self.ip {
            write!(f, " at offset {}", ip)?;
        }
        if self.position.is_known() {
            write!(f, " (line {})", self.position)?;
        }

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            let depth = self.call_stack.len();
            let elided = depth.saturating_sub(2 * CALL_STACK_EDGE);
            for (i, frame) in self.call_stack.iter().rev().enumerate() {
                if elided > 0 && i == CALL_STACK_EDGE {
                    write!(f, "\n    ... {} more frames", elided)?;
                }
                if elided > 0 && (CALL_STACK_EDGE..depth - CALL_STACK_EDGE).contains(&i) {
                    continue;
                }
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        RuntimeError {
            kind,
            ip: None,
            position: Position::default(),
            call_stack: Vec::new(),
        }
    }

    pub fn at(mut self, ip: usize, position: Position) -> Self {
        self.ip = Some(ip);
        self.position = position;
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

impl From<ValueError> for RuntimeError {
    fn from(err: ValueError) -> Self {
        RuntimeError::new(err.into())
    }
}

impl From<VerifyError> for RuntimeError {
    fn from(err: VerifyError) -> Self {
        RuntimeError::new(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location_and_call_stack() {
        let err = RuntimeError::new(RuntimeErrorKind::WrongArity {
            name: "add".to_string(),
            expected: 2,
            got: 1,
        })
        .at(12, Position::new(3, 4))
        .with_context("main")
        .with_context("add");

        let text = err.to_string();
        assert!(text.starts_with(
            "runtime error: function 'add' expected 2 argument(s) but received 1 at offset 12 (line 3:4)"
        ));
        assert!(text.contains("0: add"));
        assert!(text.contains("1: main"));
    }

    #[test]
    fn test_deep_call_stack_is_elided() {
        let err = (0..256).fold(
            RuntimeError::new(RuntimeErrorKind::CallDepthExceeded(256)).with_context("<main>"),
            |err, _| err.with_context("f"),
        );

        let text = err.to_string();
        assert!(text.contains("\n    0: f"));
        assert!(text.contains("\n    9: f"));
        assert!(!text.contains("\n    10: f"));
        assert!(text.contains("\n    ... 237 more frames"));
        assert!(text.contains("\n    247: f"));
        assert!(text.contains("\n    256: <main>"));
        assert_eq!(text.lines().count(), 2 + 2 * CALL_STACK_EDGE + 1);
    }

    #[test]
    fn test_value_errors_convert() {
        let err: RuntimeError = ValueError::DivisionByZero.into();
        assert_eq!(err.kind, RuntimeErrorKind::Value(ValueError::DivisionByZero));
        assert_eq!(err.to_string(), "runtime error: division by zero");
    }
}
