use crate::bytecode::chunk::{Chunk, Instruction};
use crate::bytecode::op::Op;
use crate::lang::value::Value;
use std::collections::HashMap;
use std::fmt::Write;

/// Print disassembly of a chunk to stdout.
pub fn print_chunk(chunk: &Chunk) {
    print!("{}", disassemble(chunk));
}

/// Render a chunk as a human-readable listing.
///
/// Lines are `offset [►] NAME operands ; comment`, where `►` marks an
/// instruction some jump or function entry lands on. Decoding stops at the
/// first malformed instruction, which is reported in place.
pub fn disassemble(chunk: &Chunk) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(
        out,
        " chunk: {} bytes, {} constants",
        chunk.len(),
        chunk.constants.len()
    );
    let _ = writeln!(out, "════════════════════════════════════════");

    let mut offset = 0;
    let mut decoded = Vec::new();
    while offset < chunk.len() {
        match chunk.decode(offset) {
            Ok(ins) => {
                offset = ins.next();
                decoded.push(ins);
            }
            Err(e) => {
                decoded_lines(chunk, &decoded, &mut out);
                let _ = writeln!(out, "{:04}   <{}>", offset, e);
                return out;
            }
        }
    }

    decoded_lines(chunk, &decoded, &mut out);
    out
}

fn decoded_lines(chunk: &Chunk, decoded: &[Instruction], out: &mut String) {
    let targets = collect_targets(decoded);

    for ins in decoded {
        let marker = if targets.contains_key(&ins.offset) {
            "►"
        } else {
            " "
        };
        let _ = writeln!(
            out,
            "{:04} {} {}",
            ins.offset,
            marker,
            format_instruction(chunk, ins)
        );
    }
}

fn collect_targets(decoded: &[Instruction]) -> HashMap<usize, usize> {
    let mut targets = HashMap::new();

    for ins in decoded {
        let Some(target) = ins.op.target_operand().map(|i| ins.operand(i)) else {
            continue;
        };
        *targets.entry(target).or_insert(0) += 1;
    }

    targets
}

/// One instruction without its offset, e.g. `PUSH 0 ; 1`.
pub fn format_instruction(chunk: &Chunk, ins: &Instruction) -> String {
    let operands: Vec<String> = ins.operands().iter().map(|o| o.to_string()).collect();
    let head = format!("{:<12} {}", ins.op.name(), operands.join(" "));

    let comment = match ins.op {
        Op::Push => chunk
            .constants
            .get(ins.operand(0))
            .map(format_constant)
            .unwrap_or_else(|| "?".to_string()),
        Op::Get | Op::Set | Op::Define => name(chunk, ins.operand(0)),
        Op::Call => format!("{}/{}", name(chunk, ins.operand(0)), ins.operand(1)),
        Op::CallLocal => format!("slot {}/{}", ins.operand(0), ins.operand(1)),
        Op::NewFn => format!(
            "fn {}/{} @ {:04}",
            name(chunk, ins.operand(2)),
            ins.operand(0),
            ins.operand(1)
        ),
        Op::NewAnonFn => format!("fn/{} @ {:04}", ins.operand(0), ins.operand(1)),
        Op::Jump | Op::JumpFalse => {
            let direction = if ins.operand(0) <= ins.offset {
                "↑"
            } else {
                "↓"
            };
            format!("{} {:04}", direction, ins.operand(0))
        }
        _ => return head.trim_end().to_string(),
    };

    format!("{:<20} ; {}", head.trim_end(), comment)
}

fn name(chunk: &Chunk, index: usize) -> String {
    chunk.name_at(index).unwrap_or("?").to_string()
}

/// Constants as they would appear in source: strings quoted.
pub fn format_constant(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(format_constant).collect();
            format!("[{}]", inner.join(", "))
        }
        other => other.to_string(),
    }
}

/// Render the constant pool, one entry per line.
pub fn format_constants(chunk: &Chunk) -> String {
    let mut out = String::new();
    for (i, value) in chunk.constants.iter().enumerate() {
        let _ = writeln!(out, "{:4}: {}", i, format_constant(value));
    }
    out
}
