use crate::lang::operator::{BinaryOp, UnaryOp};

/// Size in bytes of every instruction operand (little-endian `u16`).
pub const OPERAND_WIDTH: usize = 2;

// =============================================================================
// OP - one-byte opcodes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    Halt = 0,

    // constants and stack
    Push,
    Pop,
    PopN,

    // unary
    Negate,
    Not,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // comparison
    Less,
    LessEq,
    Greater,
    GreaterEq,
    EqEq,
    NotEq,

    // named bindings (globals and top-level block scopes)
    Get,
    Set,
    Define,

    // frame-relative slots
    GetLocal,
    SetLocal,

    // control flow, absolute targets
    Jump,
    JumpFalse,

    // functions
    NewFn,
    Call,
    Return,

    Print,
    MakeList,

    OpenScope,
    CloseScope,

    // function values
    NewAnonFn,
    CallLocal,
}

impl Op {
    /// Every opcode, indexed by its byte value.
    pub const ALL: [Op; 32] = [
        Op::Halt,
        Op::Push,
        Op::Pop,
        Op::PopN,
        Op::Negate,
        Op::Not,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::Less,
        Op::LessEq,
        Op::Greater,
        Op::GreaterEq,
        Op::EqEq,
        Op::NotEq,
        Op::Get,
        Op::Set,
        Op::Define,
        Op::GetLocal,
        Op::SetLocal,
        Op::Jump,
        Op::JumpFalse,
        Op::NewFn,
        Op::Call,
        Op::Return,
        Op::Print,
        Op::MakeList,
        Op::OpenScope,
        Op::CloseScope,
        Op::NewAnonFn,
        Op::CallLocal,
    ];

    pub fn from_byte(byte: u8) -> Option<Op> {
        Op::ALL.get(byte as usize).copied()
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Number of `u16` operands following the opcode byte.
    pub fn operand_count(self) -> usize {
        match self {
            Op::Push
            | Op::PopN
            | Op::Get
            | Op::Set
            | Op::Define
            | Op::GetLocal
            | Op::SetLocal
            | Op::Jump
            | Op::JumpFalse
            | Op::Print
            | Op::MakeList => 1,
            Op::Call => 2,      // <name> <argc>
            Op::CallLocal => 2, // <slot> <argc>
            Op::NewAnonFn => 2, // <arity> <addr>
            Op::NewFn => 3,     // <arity> <addr> <name>
            _ => 0,
        }
    }

    /// Total encoded size of the instruction.
    pub fn width(self) -> usize {
        1 + OPERAND_WIDTH * self.operand_count()
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::Jump | Op::JumpFalse)
    }

    /// Where a jump or function-creating instruction transfers control.
    pub fn target_operand(self) -> Option<usize> {
        match self {
            Op::Jump | Op::JumpFalse => Some(0),
            Op::NewFn | Op::NewAnonFn => Some(1),
            _ => None,
        }
    }

    /// Opcodes whose operand 0 indexes a name constant.
    pub fn takes_name(self) -> bool {
        matches!(self, Op::Get | Op::Set | Op::Define | Op::Call)
    }

    pub fn from_binary(op: BinaryOp) -> Option<Op> {
        Some(match op {
            BinaryOp::Add => Op::Add,
            BinaryOp::Sub => Op::Sub,
            BinaryOp::Mul => Op::Mul,
            BinaryOp::Div => Op::Div,
            BinaryOp::Less => Op::Less,
            BinaryOp::LessEq => Op::LessEq,
            BinaryOp::Greater => Op::Greater,
            BinaryOp::GreaterEq => Op::GreaterEq,
            BinaryOp::EqEq => Op::EqEq,
            BinaryOp::NotEq => Op::NotEq,
            // lowered to jumps
            BinaryOp::And | BinaryOp::Or => return None,
        })
    }

    /// Inverse of [`Op::from_binary`].
    pub fn binary_op(self) -> Option<BinaryOp> {
        Some(match self {
            Op::Add => BinaryOp::Add,
            Op::Sub => BinaryOp::Sub,
            Op::Mul => BinaryOp::Mul,
            Op::Div => BinaryOp::Div,
            Op::Less => BinaryOp::Less,
            Op::LessEq => BinaryOp::LessEq,
            Op::Greater => BinaryOp::Greater,
            Op::GreaterEq => BinaryOp::GreaterEq,
            Op::EqEq => BinaryOp::EqEq,
            Op::NotEq => BinaryOp::NotEq,
            _ => return None,
        })
    }

    pub fn from_unary(op: UnaryOp) -> Op {
        match op {
            UnaryOp::Negate => Op::Negate,
            UnaryOp::Not => Op::Not,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::Halt => "HALT",
            Op::Push => "PUSH",
            Op::Pop => "POP",
            Op::PopN => "POP_N",
            Op::Negate => "NEGATE",
            Op::Not => "NOT",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Less => "LESS",
            Op::LessEq => "LESS_EQ",
            Op::Greater => "GREATER",
            Op::GreaterEq => "GREATER_EQ",
            Op::EqEq => "EQ_EQ",
            Op::NotEq => "NOT_EQ",
            Op::Get => "GET",
            Op::Set => "SET",
            Op::Define => "DEFINE",
            Op::GetLocal => "GET_LOCAL",
            Op::SetLocal => "SET_LOCAL",
            Op::Jump => "JUMP",
            Op::JumpFalse => "JUMP_FALSE",
            Op::NewFn => "NEW_FN",
            Op::Call => "CALL",
            Op::Return => "RETURN",
            Op::Print => "PRINT",
            Op::MakeList => "MAKE_LIST",
            Op::OpenScope => "OPEN_SCOPE",
            Op::CloseScope => "CLOSE_SCOPE",
            Op::NewAnonFn => "NEW_ANON_FN",
            Op::CallLocal => "CALL_LOCAL",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
