use crate::bytecode::chunk::{Chunk, Instruction};
use crate::bytecode::disasm::{format_constants, format_instruction};
use crate::bytecode::op::Op;
use crate::bytecode::verify::{VerifyError, verify};
use crate::lang::value::{Function, NativeFn, Value};
use crate::runtime::config::VmConfig;
use crate::runtime::debugger::{StepCommand, StepDebugger};
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::{debug, trace};

/// Counters for one execution, reset by every [`Vm::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub steps: usize,
    pub frames_pushed: usize,
    pub frames_popped: usize,
    pub scopes_pushed: usize,
    pub scopes_popped: usize,
}

/// Name given to functions created by `NewAnonFn`.
pub const ANON_FN_NAME: &str = "anonymous";

enum Flow {
    Continue,
    Halt,
}

/// Stack machine executing a [`Chunk`].
///
/// `scopes[0]` holds the globals. They survive between runs, so an
/// embedder can register natives once and run several chunks.
pub struct Vm {
    stack: Vec<Value>,
    scopes: Vec<HashMap<String, Value>>,
    frames: Vec<Frame>,
    ip: usize,
    config: VmConfig,
    stats: ExecStats,
    out: Box<dyn Write>,
    debugger: Option<StepDebugger>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: Vec::new(),
            scopes: vec![HashMap::new()],
            frames: vec![Frame::top_level()],
            ip: 0,
            config,
            stats: ExecStats::default(),
            out: Box::new(io::stdout()),
            debugger: None,
        }
    }

    /// Send `print` output somewhere other than stdout.
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn with_debugger(mut self, debugger: StepDebugger) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        self.scopes[0].insert(name.into(), value);
    }

    pub fn define_native(&mut self, name: &str, arity: u16, func: NativeFn) {
        self.define_global(name, Value::native(name, arity, func));
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.scopes[0].get(name)
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.scopes[0]
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn stats(&self) -> ExecStats {
        self.stats
    }

    /// Open runtime scopes above the globals.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Frames on the call stack, including the top-level frame.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn reset_execution_state(&mut self) {
        self.stack.clear();
        self.scopes.truncate(1);
        self.frames.clear();
        self.frames.push(Frame::top_level());
        self.ip = 0;
        self.stats = ExecStats::default();
    }

    /// Verify and execute `chunk` until `Halt`.
    pub fn run(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        verify(chunk)?;
        self.reset_execution_state();

        debug!(
            bytes = chunk.len(),
            constants = chunk.constants.len(),
            "running chunk"
        );

        let result = self.exec_loop(chunk);

        match &result {
            Ok(()) => debug!(steps = self.stats.steps, "halted"),
            Err(e) => debug!(error = %e.kind, ip = ?e.ip, "execution failed"),
        }
        result
    }

    // =========================================================================
    // Dispatch loop
    // =========================================================================

    fn exec_loop(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        // restored on a debugger `reset`
        let initial_globals = self.debugger.as_ref().map(|_| self.scopes[0].clone());

        loop {
            let at = self.ip;
            let flow = self
                .check_limits()
                .and_then(|()| self.step(chunk, at))
                .map_err(|e| self.locate(e, chunk, at))?;

            if self.debugger.is_some() {
                match self.debug_prompt(chunk, at)? {
                    StepCommand::Continue => {}
                    StepCommand::Exit => return Ok(()),
                    StepCommand::Reset => {
                        self.reset_execution_state();
                        if let Some(globals) = &initial_globals {
                            self.scopes[0] = globals.clone();
                        }
                        continue;
                    }
                }
            }

            if let Flow::Halt = flow {
                return Ok(());
            }
        }
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.stats.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.stats.steps > max {
                return Err(RuntimeErrorKind::StepLimitExceeded(max).into());
            }
        }
        Ok(())
    }

    fn step(&mut self, chunk: &Chunk, at: usize) -> Result<Flow, RuntimeError> {
        let ins = chunk
            .decode(at)
            .map_err(|_| RuntimeErrorKind::IpOutOfBounds(at))?;

        trace!(ip = at, op = ins.op.name(), depth = self.stack.len(), "step");

        self.ip = ins.next();

        match ins.op {
            Op::Halt => return Ok(Flow::Halt),

            Op::Push => {
                let value = constant(chunk, &ins, 0)?.clone();
                self.push(value)?;
            }

            Op::Pop => {
                self.pop()?;
            }

            Op::PopN => self.drop_n(ins.operand(0))?,

            Op::Negate => {
                let value = self.pop()?;
                self.push(value.negate()?)?;
            }

            Op::Not => {
                let value = self.pop()?;
                self.push(value.not()?)?;
            }

            // In place on the left operand's slot.
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let rhs = self.pop()?;
                let lhs = self
                    .stack
                    .last_mut()
                    .ok_or(RuntimeErrorKind::StackUnderflow)?;
                if let Some(op) = ins.op.binary_op() {
                    lhs.modify(op, &rhs)?;
                }
            }

            Op::Less | Op::LessEq | Op::Greater | Op::GreaterEq | Op::EqEq | Op::NotEq => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                if let Some(op) = ins.op.binary_op() {
                    self.push(Value::binary(op, &lhs, &rhs)?)?;
                }
            }

            Op::Get => {
                let name = name(chunk, &ins, 0)?;
                let value = self
                    .find_scope(name)
                    .and_then(|i| self.scopes[i].get(name))
                    .cloned()
                    .ok_or_else(|| RuntimeErrorKind::UndefinedVariable(name.to_string()))?;
                self.push(value)?;
            }

            Op::Set => {
                let name = name(chunk, &ins, 0)?;
                let value = self.peek()?.clone();
                let scope = self.find_scope(name).unwrap_or(0);
                self.scopes[scope].insert(name.to_string(), value);
            }

            Op::Define => {
                let name = name(chunk, &ins, 0)?;
                let value = self.peek()?.clone();
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.to_string(), value);
                }
            }

            Op::GetLocal => {
                let index = self.slot(ins.operand(0))?;
                let value = self.stack[index].clone();
                self.push(value)?;
            }

            Op::SetLocal => {
                let index = self.slot(ins.operand(0))?;
                let top = self.stack.len() - 1;
                // a fresh declaration already sits in its slot
                if index != top {
                    self.stack[index] = self.stack[top].clone();
                }
            }

            Op::Jump => self.ip = ins.operand(0),

            Op::JumpFalse => match self.pop()? {
                Value::Bool(false) => self.ip = ins.operand(0),
                Value::Bool(true) => {}
                other => return Err(RuntimeErrorKind::ConditionNotBool(other.type_name()).into()),
            },

            Op::NewFn => {
                let name = name(chunk, &ins, 2)?;
                let function = Function {
                    name: name.to_string(),
                    entry: ins.operand(1),
                    arity: ins.operands()[0],
                };
                trace!(name, entry = function.entry, "registered function");
                self.define_global(name, Value::CompiledFunction(Rc::new(function)));
            }

            Op::NewAnonFn => {
                let function = Function {
                    name: ANON_FN_NAME.to_string(),
                    entry: ins.operand(1),
                    arity: ins.operands()[0],
                };
                self.push(Value::CompiledFunction(Rc::new(function)))?;
            }

            Op::Call => {
                let name = name(chunk, &ins, 0)?;
                self.call(name, ins.operand(1))?;
            }

            Op::CallLocal => {
                let slot = ins.operand(0);
                let callee = self.stack[self.slot(slot)?].clone();
                self.invoke(&format!("local slot {}", slot), callee, ins.operand(1))?;
            }

            Op::Return => self.ret()?,

            Op::Print => self.print(ins.operand(0))?,

            Op::MakeList => {
                let items = self.take(ins.operand(0))?;
                self.push(Value::List(items))?;
            }

            Op::OpenScope => {
                if self.scope_depth() >= self.config.max_scope_depth {
                    return Err(
                        RuntimeErrorKind::ScopeDepthExceeded(self.config.max_scope_depth).into(),
                    );
                }
                self.scopes.push(HashMap::new());
                self.stats.scopes_pushed += 1;
            }

            Op::CloseScope => {
                if self.scopes.len() <= self.current_frame().scope_floor {
                    return Err(RuntimeErrorKind::ScopeUnderflow.into());
                }
                self.scopes.pop();
                self.stats.scopes_popped += 1;
            }
        }

        Ok(Flow::Continue)
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call(&mut self, name: &str, argc: usize) -> Result<(), RuntimeError> {
        let callee = self
            .find_scope(name)
            .and_then(|i| self.scopes[i].get(name))
            .cloned()
            .ok_or_else(|| RuntimeErrorKind::UndefinedVariable(name.to_string()))?;
        self.invoke(name, callee, argc)
    }

    fn invoke(&mut self, name: &str, callee: Value, argc: usize) -> Result<(), RuntimeError> {
        let arity = match &callee {
            Value::CompiledFunction(f) => f.arity as usize,
            Value::NativeFunction(f) => f.arity as usize,
            other => {
                return Err(RuntimeErrorKind::NotCallable {
                    name: name.to_string(),
                    found: other.type_name(),
                }
                .into());
            }
        };

        let available = self.stack.len().saturating_sub(self.current_frame().stack_base);
        if argc != arity || available < arity {
            return Err(RuntimeErrorKind::WrongArity {
                name: name.to_string(),
                expected: arity,
                got: argc.min(available),
            }
            .into());
        }

        match callee {
            Value::CompiledFunction(function) => {
                if self.frames.len() > self.config.max_call_depth {
                    return Err(
                        RuntimeErrorKind::CallDepthExceeded(self.config.max_call_depth).into(),
                    );
                }

                let frame = Frame::call(
                    &function.name,
                    self.ip,
                    self.stack.len() - arity,
                    self.scopes.len(),
                );
                trace!(name, base = frame.stack_base, "call");

                self.frames.push(frame);
                self.stats.frames_pushed += 1;
                self.ip = function.entry;
            }

            Value::NativeFunction(native) => {
                let args = self.take(arity)?;
                let result = (native.func)(&args).map_err(|message| RuntimeErrorKind::Native {
                    name: native.name.clone(),
                    message,
                })?;
                self.push(result)?;
            }

            _ => {}
        }

        Ok(())
    }

    /// Tear down the current frame, leaving exactly one value for the caller.
    fn ret(&mut self) -> Result<(), RuntimeError> {
        if self.current_frame().is_top_level() {
            return Err(RuntimeErrorKind::FrameUnderflow.into());
        }
        let frame = self.frames.pop().ok_or(RuntimeErrorKind::FrameUnderflow)?;
        self.stats.frames_popped += 1;

        let value = if self.stack.len() > frame.stack_base {
            self.stack.pop().unwrap_or(Value::Unit)
        } else {
            Value::Unit
        };
        self.stack.truncate(frame.stack_base);

        if self.scopes.len() > frame.scope_floor {
            self.stats.scopes_popped += self.scopes.len() - frame.scope_floor;
            self.scopes.truncate(frame.scope_floor);
        }

        trace!(name = %frame.name, value = %value, "return");
        self.push(value)?;
        self.ip = frame.return_address.ok_or(RuntimeErrorKind::FrameUnderflow)?;
        Ok(())
    }

    fn print(&mut self, count: usize) -> Result<(), RuntimeError> {
        let values = self.take(count)?;

        let mut line = String::new();
        for value in &values {
            let _ = write!(line, "{}", value);
        }

        writeln!(self.out, "{}", line).map_err(|e| RuntimeErrorKind::Output(e.to_string()))?;
        Ok(())
    }

    // =========================================================================
    // Stack and scope helpers
    // =========================================================================

    fn current_frame(&self) -> &Frame {
        // the top-level frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    /// Innermost scope visible from the current frame that binds `name`.
    /// Function frames see their own scopes and the globals only.
    fn find_scope(&self, name: &str) -> Option<usize> {
        let floor = self.current_frame().scope_floor.min(self.scopes.len());
        (floor..self.scopes.len())
            .rev()
            .chain(std::iter::once(0))
            .find(|&i| self.scopes[i].contains_key(name))
    }

    fn slot(&self, slot: usize) -> Result<usize, RuntimeError> {
        let index = self.current_frame().stack_base + slot;
        if index >= self.stack.len() {
            return Err(RuntimeErrorKind::BadSlot(slot).into());
        }
        Ok(index)
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.max_stack_size {
            return Err(RuntimeErrorKind::StackOverflow(self.config.max_stack_size).into());
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeErrorKind::StackUnderflow.into())
    }

    fn peek(&self) -> Result<&Value, RuntimeError> {
        self.stack
            .last()
            .ok_or_else(|| RuntimeErrorKind::StackUnderflow.into())
    }

    /// Pop the top `n` values, preserving their order.
    fn take(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if n > self.stack.len() {
            return Err(RuntimeErrorKind::StackUnderflow.into());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn drop_n(&mut self, n: usize) -> Result<(), RuntimeError> {
        if n > self.stack.len() {
            return Err(RuntimeErrorKind::StackUnderflow.into());
        }
        self.stack.truncate(self.stack.len() - n);
        Ok(())
    }

    fn locate(&self, err: RuntimeError, chunk: &Chunk, at: usize) -> RuntimeError {
        if err.ip.is_some() {
            return err;
        }
        self.frames
            .iter()
            .fold(err.at(at, chunk.position_at(at)), |err, frame| {
                err.with_context(&frame.name)
            })
    }

    // =========================================================================
    // Step debugger
    // =========================================================================

    fn debug_prompt(&mut self, chunk: &Chunk, last: usize) -> Result<StepCommand, RuntimeError> {
        let state = self.render_state(chunk, last);
        let output = |e: io::Error| RuntimeError::new(RuntimeErrorKind::Output(e.to_string()));

        write!(self.out, "{}", state).map_err(output)?;

        match self.debugger.as_mut() {
            Some(debugger) => debugger.prompt(&mut *self.out).map_err(output),
            None => Ok(StepCommand::Continue),
        }
    }

    /// Current and next instruction, globals, constants and stack.
    pub fn render_state(&self, chunk: &Chunk, last: usize) -> String {
        let mut out = String::new();

        let line = |offset: usize| match chunk.decode(offset) {
            Ok(ins) => format!("{:04} {}", offset, format_instruction(chunk, &ins)),
            Err(e) => format!("{:04} <{}>", offset, e),
        };

        let _ = writeln!(out, "== General ==");
        let _ = writeln!(out, "[Now]  {}", line(last));
        if self.ip < chunk.len() {
            let _ = writeln!(out, "[Next] {}", line(self.ip));
        } else {
            let _ = writeln!(out, "-- End --");
        }

        let _ = writeln!(out, "=== Globals ===");
        let mut names: Vec<&String> = self.scopes[0].keys().collect();
        names.sort();
        for (i, name) in names.iter().enumerate() {
            if i >= 20 {
                let _ = writeln!(out, "...");
                break;
            }
            let _ = writeln!(out, "{} = '{}'", name, self.scopes[0][*name]);
        }

        let _ = writeln!(out, "=== Constants ===");
        out.push_str(&format_constants(chunk));

        let _ = writeln!(out, "=== Stack ===");
        for (i, value) in self.stack.iter().enumerate().rev() {
            let _ = writeln!(out, "{:4}: {}", i, value);
        }

        out
    }
}

fn constant<'c>(chunk: &'c Chunk, ins: &Instruction, i: usize) -> Result<&'c Value, RuntimeError> {
    let index = ins.operand(i);
    chunk.constants.get(index).ok_or_else(|| {
        VerifyError::BadConstant {
            offset: ins.offset,
            op: ins.op,
            index,
            len: chunk.constants.len(),
        }
        .into()
    })
}

fn name<'c>(chunk: &'c Chunk, ins: &Instruction, i: usize) -> Result<&'c str, RuntimeError> {
    let value = constant(chunk, ins, i)?;
    value.as_name().ok_or_else(|| {
        VerifyError::NotAName {
            offset: ins.offset,
            op: ins.op,
            found: value.type_name(),
        }
        .into()
    })
}
