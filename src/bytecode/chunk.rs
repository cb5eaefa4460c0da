use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{OPERAND_WIDTH, Op};
use crate::bytecode::verify::VerifyError;
use crate::lang::token::Position;
use crate::lang::value::Value;
use serde::{Deserialize, Serialize};

/// Highest byte offset a program may reach; every address fits an operand.
pub const MAX_PROGRAM_LEN: usize = u16::MAX as usize;

/// A compiled program: instruction bytes plus the constant pool they index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub instructions: Vec<u8>,
    pub constants: Vec<Value>,
    /// Source position of the instruction each byte belongs to.
    pub positions: Vec<Position>,
    #[serde(skip)]
    last_op: usize,
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub op: Op,
    operands: [u16; 3],
}

impl Instruction {
    pub fn operand(&self, i: usize) -> usize {
        self.operands[i] as usize
    }

    pub fn operands(&self) -> &[u16] {
        &self.operands[..self.op.operand_count()]
    }

    /// Offset of the instruction that follows.
    pub fn next(&self) -> usize {
        self.offset + self.op.width()
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.instructions == other.instructions
            && self.constants == other.constants
            && self.positions == other.positions
    }
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chunk from raw parts, with no source positions.
    pub fn from_parts(instructions: Vec<u8>, constants: Vec<Value>) -> Self {
        let positions = vec![Position::default(); instructions.len()];
        Self {
            instructions,
            constants,
            positions,
            last_op: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Offset the next emitted instruction will start at.
    pub fn current_offset(&self) -> usize {
        self.instructions.len()
    }

    pub fn add_op(&mut self, op: Op, position: Position) -> Result<usize, CompileError> {
        self.add_ops(op, &[], position)
    }

    /// Append an instruction and return its start offset.
    pub fn add_ops(
        &mut self,
        op: Op,
        operands: &[u16],
        position: Position,
    ) -> Result<usize, CompileError> {
        debug_assert_eq!(operands.len(), op.operand_count(), "{} operand count", op);

        let at = self.instructions.len();
        if at + op.width() > MAX_PROGRAM_LEN {
            return Err(CompileError::limit("program length"));
        }

        self.instructions.push(op.byte());
        for operand in operands {
            self.instructions.extend_from_slice(&operand.to_le_bytes());
        }
        self.positions.resize(self.instructions.len(), position);
        self.last_op = at;

        Ok(at)
    }

    /// Append to the constant pool. Equal values get separate entries.
    pub fn add_constant(&mut self, value: Value) -> Result<u16, CompileError> {
        let index =
            u16::try_from(self.constants.len()).map_err(|_| CompileError::limit("constant pool"))?;
        self.constants.push(value);
        Ok(index)
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.instructions.get(offset..offset + OPERAND_WIDTH)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Point the jump instruction starting at `at` to `target`.
    pub fn patch_jump(&mut self, at: usize, target: u16) {
        debug_assert!(
            Op::from_byte(self.instructions[at]).is_some_and(Op::is_jump),
            "patching a non-jump at {}",
            at
        );
        let [lo, hi] = target.to_le_bytes();
        self.instructions[at + 1] = lo;
        self.instructions[at + 2] = hi;
    }

    /// Jump past everything emitted so far.
    pub fn patch_jump_to_next(&mut self, at: usize) {
        // add_ops keeps the stream length within u16 range
        self.patch_jump(at, self.current_offset() as u16);
    }

    /// Jump to the start of the most recently emitted instruction.
    pub fn patch_jump_to_end(&mut self, at: usize) {
        self.patch_jump(at, self.last_op as u16);
    }

    pub fn position_at(&self, offset: usize) -> Position {
        self.positions.get(offset).copied().unwrap_or_default()
    }

    pub fn decode(&self, offset: usize) -> Result<Instruction, VerifyError> {
        let byte = *self
            .instructions
            .get(offset)
            .ok_or(VerifyError::OutOfBounds { offset })?;
        let op = Op::from_byte(byte).ok_or(VerifyError::UnknownOpcode { offset, byte })?;

        let mut operands = [0u16; 3];
        for (i, slot) in operands.iter_mut().take(op.operand_count()).enumerate() {
            *slot = self
                .read_u16(offset + 1 + i * OPERAND_WIDTH)
                .ok_or(VerifyError::Truncated { offset, op })?;
        }

        Ok(Instruction {
            offset,
            op,
            operands,
        })
    }

    /// Decode the whole stream front to back.
    pub fn decode_all(&self) -> Result<Vec<Instruction>, VerifyError> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.instructions.len() {
            let instruction = self.decode(offset)?;
            offset = instruction.next();
            out.push(instruction);
        }
        Ok(out)
    }

    /// The identifier stored in a name constant.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.constants.get(index).and_then(Value::as_name)
    }
}
