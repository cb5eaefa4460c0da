use crate::bytecode::chunk::Chunk;
use crate::bytecode::op::Op;
use crate::lang::value::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("verify error: instruction stream is empty")]
    Empty,

    #[error("verify error: offset {offset} is past the end of the instruction stream")]
    OutOfBounds { offset: usize },

    #[error("verify error: unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { offset: usize, byte: u8 },

    #[error("verify error: truncated {op} instruction at offset {offset}")]
    Truncated { offset: usize, op: Op },

    #[error(
        "verify error: {op} at offset {offset} targets {target}, which is not an instruction boundary"
    )]
    BadTarget { offset: usize, op: Op, target: usize },

    #[error("verify error: {op} at offset {offset} uses constant {index}, pool has {len}")]
    BadConstant {
        offset: usize,
        op: Op,
        index: usize,
        len: usize,
    },

    #[error(
        "verify error: function '{name}' in constant {index} enters at {entry}, which is not an instruction boundary"
    )]
    BadEntry {
        index: usize,
        name: String,
        entry: usize,
    },

    #[error("verify error: {op} at offset {offset} expects a name constant, found {found}")]
    NotAName {
        offset: usize,
        op: Op,
        found: &'static str,
    },
}

/// Check that a chunk is structurally sound before it is executed.
///
/// Every jump and function entry must land on the first byte of an
/// instruction, and every constant operand must exist with the right kind.
pub fn verify(chunk: &Chunk) -> Result<(), VerifyError> {
    if chunk.is_empty() {
        return Err(VerifyError::Empty);
    }

    let instructions = chunk.decode_all()?;
    let boundaries: Vec<usize> = instructions.iter().map(|i| i.offset).collect();
    let is_boundary = |target: usize| boundaries.binary_search(&target).is_ok();

    for ins in &instructions {
        let (offset, op) = (ins.offset, ins.op);

        if let Some(target) = op.target_operand().map(|i| ins.operand(i)) {
            if !is_boundary(target) {
                return Err(VerifyError::BadTarget { offset, op, target });
            }
        }

        let constant = match op {
            Op::Push | Op::Get | Op::Set | Op::Define | Op::Call => Some(ins.operand(0)),
            Op::NewFn => Some(ins.operand(2)),
            _ => None,
        };
        let Some(index) = constant else { continue };

        let value = chunk.constants.get(index).ok_or(VerifyError::BadConstant {
            offset,
            op,
            index,
            len: chunk.constants.len(),
        })?;

        if (op.takes_name() || op == Op::NewFn) && value.as_name().is_none() {
            return Err(VerifyError::NotAName {
                offset,
                op,
                found: value.type_name(),
            });
        }
    }

    for (index, value) in chunk.constants.iter().enumerate() {
        check_entries(value, index, &is_boundary)?;
    }

    Ok(())
}

/// Function constants (only found in loaded files) must enter at an
/// instruction boundary too, including those nested in lists.
fn check_entries(
    value: &Value,
    index: usize,
    is_boundary: &impl Fn(usize) -> bool,
) -> Result<(), VerifyError> {
    match value {
        Value::CompiledFunction(function) if !is_boundary(function.entry) => {
            Err(VerifyError::BadEntry {
                index,
                name: function.name.clone(),
                entry: function.entry,
            })
        }
        Value::List(items) => items
            .iter()
            .try_for_each(|item| check_entries(item, index, is_boundary)),
        _ => Ok(()),
    }
}
