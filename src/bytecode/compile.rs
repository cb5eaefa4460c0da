use std::collections::HashMap;

use tracing::{debug, trace};

use crate::{
    bytecode::{Chunk, Op, compile_error::CompileError},
    lang::{
        node::{Block, Expr, FnDef, IfStmt, Stmt, VarDecl, WhileStmt},
        operator::BinaryOp,
        program::Program,
        token::{Position, Token, TokenKind},
        value::Value,
    },
};

/// Lowers an analyzed [`Program`] into a [`Chunk`] in one pass.
///
/// Bindings inside functions live in frame-relative stack slots resolved
/// here; everything outside a function is addressed by name at run time,
/// with top-level blocks opening runtime scopes.
pub struct Compiler {
    chunk: Chunk,

    /// Slot tables of the functions being compiled, innermost last.
    functions: Vec<FnScope>,

    /// Runtime scopes opened by enclosing top-level blocks.
    block_depth: usize,

    /// Enclosing loops of the current function (or of the top level).
    loops: Vec<LoopContext>,

    /// Name constants already in the pool.
    names: HashMap<String, u16>,

    /// Position attached to instructions emitted next.
    position: Position,
}

struct FnScope {
    locals: Vec<Local>,
    /// Block nesting inside the function body; parameters sit at 0.
    depth: usize,
}

struct Local {
    name: String,
    depth: usize,
}

struct LoopContext {
    /// Slot count when the loop body is entered.
    locals: usize,
    /// Runtime scope depth when the loop body is entered.
    block_depth: usize,
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

/// Compile a whole program, terminated by `Halt`.
pub fn compile(program: &Program) -> Result<Chunk, CompileError> {
    Compiler::new().compile_program(program)
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            functions: Vec::new(),
            block_depth: 0,
            loops: Vec::new(),
            names: HashMap::new(),
            position: Position::default(),
        }
    }

    pub fn compile_program(mut self, program: &Program) -> Result<Chunk, CompileError> {
        debug!(statements = program.statements.len(), "compiling program");

        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        self.emit(Op::Halt)?;

        debug!(
            bytes = self.chunk.len(),
            constants = self.chunk.constants.len(),
            "compiled program"
        );
        Ok(self.chunk)
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn emit(&mut self, op: Op) -> Result<usize, CompileError> {
        self.chunk.add_op(op, self.position)
    }

    fn emit_with(&mut self, op: Op, operands: &[u16]) -> Result<usize, CompileError> {
        self.chunk.add_ops(op, operands, self.position)
    }

    /// Emit a jump with a placeholder target, to be patched later.
    fn emit_jump(&mut self, op: Op) -> Result<usize, CompileError> {
        self.emit_with(op, &[0])
    }

    fn emit_pop(&mut self, count: usize) -> Result<(), CompileError> {
        match count {
            0 => {}
            1 => {
                self.emit(Op::Pop)?;
            }
            n => {
                let n = operand(n, "popped slot count")?;
                self.emit_with(Op::PopN, &[n])?;
            }
        }
        Ok(())
    }

    fn emit_constant(&mut self, value: Value) -> Result<(), CompileError> {
        let index = self.chunk.add_constant(value)?;
        self.emit_with(Op::Push, &[index])?;
        Ok(())
    }

    fn name_constant(&mut self, name: &str) -> Result<u16, CompileError> {
        if let Some(&index) = self.names.get(name) {
            return Ok(index);
        }
        let index = self.chunk.add_constant(Value::String(name.to_string()))?;
        self.names.insert(name.to_string(), index);
        Ok(index)
    }

    fn offset(&self) -> Result<u16, CompileError> {
        operand(self.chunk.current_offset(), "program length")
    }

    fn at(&mut self, token: &Token) {
        if token.position.is_known() {
            self.position = token.position;
        }
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    fn in_function(&self) -> bool {
        !self.functions.is_empty()
    }

    fn resolve_local(&self, name: &str) -> Option<usize> {
        let scope = self.functions.last()?;
        scope.locals.iter().rposition(|local| local.name == name)
    }

    fn local_count(&self) -> usize {
        self.functions.last().map_or(0, |scope| scope.locals.len())
    }

    fn begin_block(&mut self) -> Result<(), CompileError> {
        match self.functions.last_mut() {
            Some(scope) => scope.depth += 1,
            None => {
                self.emit(Op::OpenScope)?;
                self.block_depth += 1;
            }
        }
        Ok(())
    }

    fn end_block(&mut self) -> Result<(), CompileError> {
        let released = match self.functions.last_mut() {
            Some(scope) => {
                let keep = scope
                    .locals
                    .iter()
                    .rposition(|local| local.depth < scope.depth)
                    .map_or(0, |i| i + 1);
                let released = scope.locals.len() - keep;
                scope.locals.truncate(keep);
                scope.depth -= 1;
                Some(released)
            }
            None => None,
        };

        match released {
            Some(count) => self.emit_pop(count),
            None => {
                self.emit(Op::CloseScope)?;
                self.block_depth -= 1;
                Ok(())
            }
        }
    }

    /// Bind the value on top of the stack to `name` in the current scope.
    fn declare(&mut self, name: &Token) -> Result<(), CompileError> {
        if let Some(scope) = self.functions.last() {
            let slot = operand(scope.locals.len(), "local slot")?;
            self.emit_with(Op::SetLocal, &[slot])?;

            if let Some(scope) = self.functions.last_mut() {
                let depth = scope.depth;
                scope.locals.push(Local {
                    name: name.lexeme.clone(),
                    depth,
                });
            }
            trace!(name = %name.lexeme, slot, "declared local");
            return Ok(());
        }

        let index = self.name_constant(&name.lexeme)?;
        let op = if self.block_depth == 0 {
            Op::Set
        } else {
            Op::Define
        };
        self.emit_with(op, &[index])?;
        self.emit(Op::Pop)?;
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.at(stmt.token());

        match stmt {
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop)?;
            }

            Stmt::VarDecl(decl) => self.compile_var_decl(decl)?,

            Stmt::FnDef(def) => self.compile_fn_def(def)?,

            Stmt::Block(block) => self.compile_block(block)?,

            Stmt::If(stmt) => self.compile_if(stmt)?,

            Stmt::While(stmt) => self.compile_while(stmt)?,

            Stmt::Return { token, value } => {
                if !self.in_function() {
                    return Err(CompileError::invalid_position(
                        token,
                        "return outside of a function",
                    ));
                }
                match value {
                    Some(value) => self.compile_expr(value)?,
                    None => self.emit_constant(Value::Unit)?,
                }
                self.at(token);
                self.emit(Op::Return)?;
            }

            Stmt::Break(token) => self.compile_loop_exit(token, true)?,

            Stmt::Continue(token) => self.compile_loop_exit(token, false)?,

            Stmt::Print { token, args } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.at(token);
                let count = operand(args.len(), "print argument count")?;
                self.emit_with(Op::Print, &[count])?;
            }
        }

        Ok(())
    }

    fn compile_var_decl(&mut self, decl: &VarDecl) -> Result<(), CompileError> {
        self.compile_expr(&decl.init)?;
        self.at(&decl.token);
        self.declare(&decl.name)
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.begin_block()?;
        for stmt in &block.stmts {
            self.compile_stmt(stmt)?;
        }
        self.at(&block.token);
        self.end_block()
    }

    fn compile_if(&mut self, stmt: &IfStmt) -> Result<(), CompileError> {
        if let Some(decl) = &stmt.decl {
            self.begin_block()?;
            self.compile_var_decl(decl)?;
        }

        self.compile_expr(&stmt.cond)?;
        self.at(&stmt.token);
        let else_jump = self.emit_jump(Op::JumpFalse)?;

        self.compile_block(&stmt.then_branch)?;

        match &stmt.else_branch {
            Some(else_branch) => {
                let end_jump = self.emit_jump(Op::Jump)?;
                self.chunk.patch_jump_to_next(else_jump);
                self.compile_stmt(else_branch)?;
                self.chunk.patch_jump_to_next(end_jump);
            }
            None => self.chunk.patch_jump_to_next(else_jump),
        }

        if stmt.decl.is_some() {
            self.end_block()?;
        }
        Ok(())
    }

    fn compile_while(&mut self, stmt: &WhileStmt) -> Result<(), CompileError> {
        if let Some(decl) = &stmt.decl {
            self.begin_block()?;
            self.compile_var_decl(decl)?;
        }

        let loop_head = self.offset()?;
        self.compile_expr(&stmt.cond)?;
        self.at(&stmt.token);
        let exit_jump = self.emit_jump(Op::JumpFalse)?;

        self.loops.push(LoopContext {
            locals: self.local_count(),
            block_depth: self.block_depth,
            breaks: Vec::new(),
            continues: Vec::new(),
        });
        self.compile_block(&stmt.body)?;

        let continue_target = self.offset()?;
        if let Some(increment) = &stmt.increment {
            self.compile_expr(increment)?;
            self.emit(Op::Pop)?;
        }
        self.at(&stmt.token);
        self.emit_with(Op::Jump, &[loop_head])?;
        self.chunk.patch_jump_to_next(exit_jump);

        if let Some(ctx) = self.loops.pop() {
            for at in ctx.continues {
                self.chunk.patch_jump(at, continue_target);
            }
            for at in ctx.breaks {
                self.chunk.patch_jump_to_next(at);
            }
        }

        if stmt.decl.is_some() {
            self.end_block()?;
        }
        Ok(())
    }

    /// `break` / `continue`: drop what the loop body opened, then jump.
    fn compile_loop_exit(&mut self, token: &Token, is_break: bool) -> Result<(), CompileError> {
        let Some(ctx) = self.loops.last() else {
            return Err(CompileError::invalid_position(
                token,
                if is_break {
                    "break outside of a loop"
                } else {
                    "continue outside of a loop"
                },
            ));
        };

        let slots = self.local_count() - ctx.locals;
        let scopes = self.block_depth - ctx.block_depth;

        self.emit_pop(slots)?;
        for _ in 0..scopes {
            self.emit(Op::CloseScope)?;
        }

        let jump = self.emit_jump(Op::Jump)?;
        if let Some(ctx) = self.loops.last_mut() {
            if is_break {
                ctx.breaks.push(jump);
            } else {
                ctx.continues.push(jump);
            }
        }
        Ok(())
    }

    fn compile_fn_def(&mut self, def: &FnDef) -> Result<(), CompileError> {
        debug!(name = %def.name.lexeme, arity = def.params.len(), "compiling function");

        let (arity, entry) = self.compile_fn_body(&def.params, &def.body)?;

        self.at(&def.token);
        let name = self.name_constant(&def.name.lexeme)?;
        self.emit_with(Op::NewFn, &[arity, entry, name])?;
        Ok(())
    }

    /// Emit a function body behind a skip jump. Returns `(arity, entry)`.
    fn compile_fn_body(
        &mut self,
        params: &[Token],
        body: &Block,
    ) -> Result<(u16, u16), CompileError> {
        let arity = operand(params.len(), "parameter count")?;
        let skip = self.emit_jump(Op::Jump)?;
        let entry = self.offset()?;

        // Arguments arrive in call order, so the first parameter is slot 0.
        let locals = params
            .iter()
            .map(|param| Local {
                name: param.lexeme.clone(),
                depth: 0,
            })
            .collect();
        self.functions.push(FnScope { locals, depth: 0 });
        let outer_loops = std::mem::take(&mut self.loops);

        let compiled = body
            .stmts
            .iter()
            .try_for_each(|stmt| self.compile_stmt(stmt));

        self.loops = outer_loops;
        self.functions.pop();
        compiled?;

        self.at(&body.token);
        self.emit_constant(Value::Unit)?;
        self.emit(Op::Return)?;
        self.chunk.patch_jump_to_next(skip);
        Ok((arity, entry))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        self.at(expr.token());

        match expr {
            Expr::Literal(token) => {
                let value = literal_value(token)?;
                self.emit_constant(value)?;
            }

            Expr::List { token, items } => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.at(token);
                let count = operand(items.len(), "list literal length")?;
                self.emit_with(Op::MakeList, &[count])?;
            }

            Expr::Identifier(token) => self.compile_read(token)?,

            Expr::Assign {
                token,
                target,
                op,
                value,
            } => {
                if let Some(op) = op {
                    self.compile_read(target)?;
                    self.compile_expr(value)?;
                    self.at(token);
                    self.emit(binary_opcode(*op, token)?)?;
                } else {
                    self.compile_expr(value)?;
                    self.at(token);
                }
                self.compile_write(target)?;
            }

            Expr::Binary {
                token,
                op: BinaryOp::And,
                left,
                right,
            } => {
                // left ? right : false
                self.compile_expr(left)?;
                self.at(token);
                let short = self.emit_jump(Op::JumpFalse)?;
                self.compile_expr(right)?;
                let end = self.emit_jump(Op::Jump)?;
                self.chunk.patch_jump_to_next(short);
                self.emit_constant(Value::Bool(false))?;
                self.chunk.patch_jump_to_next(end);
            }

            Expr::Binary {
                token,
                op: BinaryOp::Or,
                left,
                right,
            } => {
                // left ? true : right
                self.compile_expr(left)?;
                self.at(token);
                let rhs = self.emit_jump(Op::JumpFalse)?;
                self.emit_constant(Value::Bool(true))?;
                let end = self.emit_jump(Op::Jump)?;
                self.chunk.patch_jump_to_next(rhs);
                self.compile_expr(right)?;
                self.chunk.patch_jump_to_next(end);
            }

            Expr::Binary {
                token,
                op,
                left,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.at(token);
                self.emit(binary_opcode(*op, token)?)?;
            }

            Expr::Unary { token, op, operand } => {
                self.compile_expr(operand)?;
                self.at(token);
                self.emit(Op::from_unary(*op))?;
            }

            Expr::Call {
                token,
                callee,
                args,
            } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.at(token);
                let argc = operand(args.len(), "argument count")?;
                match self.resolve_local(&callee.lexeme) {
                    Some(slot) => {
                        let slot = operand(slot, "local slot")?;
                        self.emit_with(Op::CallLocal, &[slot, argc])?;
                    }
                    None => {
                        let name = self.name_constant(&callee.lexeme)?;
                        self.emit_with(Op::Call, &[name, argc])?;
                    }
                }
            }

            Expr::AnonFn {
                token,
                params,
                body,
            } => {
                trace!(arity = params.len(), "compiling anonymous function");
                let (arity, entry) = self.compile_fn_body(params, body)?;
                self.at(token);
                self.emit_with(Op::NewAnonFn, &[arity, entry])?;
            }
        }

        Ok(())
    }

    fn compile_read(&mut self, name: &Token) -> Result<(), CompileError> {
        match self.resolve_local(&name.lexeme) {
            Some(slot) => {
                let slot = operand(slot, "local slot")?;
                self.emit_with(Op::GetLocal, &[slot])?;
            }
            None => {
                let index = self.name_constant(&name.lexeme)?;
                self.emit_with(Op::Get, &[index])?;
            }
        }
        Ok(())
    }

    fn compile_write(&mut self, name: &Token) -> Result<(), CompileError> {
        match self.resolve_local(&name.lexeme) {
            Some(slot) => {
                let slot = operand(slot, "local slot")?;
                self.emit_with(Op::SetLocal, &[slot])?;
            }
            None => {
                let index = self.name_constant(&name.lexeme)?;
                self.emit_with(Op::Set, &[index])?;
            }
        }
        Ok(())
    }
}

fn operand(n: usize, what: &'static str) -> Result<u16, CompileError> {
    u16::try_from(n).map_err(|_| CompileError::limit(what))
}

fn binary_opcode(op: BinaryOp, token: &Token) -> Result<Op, CompileError> {
    Op::from_binary(op).ok_or_else(|| CompileError::unhandled(token))
}

fn literal_value(token: &Token) -> Result<Value, CompileError> {
    let lexeme = token.lexeme.as_str();
    let invalid = || CompileError::invalid_literal(token);

    Ok(match token.kind {
        TokenKind::Int => Value::Int(lexeme.parse().map_err(|_| invalid())?),
        TokenKind::Float => Value::Float(lexeme.parse().map_err(|_| invalid())?),
        TokenKind::Bool => match lexeme {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        TokenKind::String => Value::String(lexeme.to_string()),
        TokenKind::Unit => Value::Unit,
        _ => return Err(CompileError::unhandled(token)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::verify::verify;
    use crate::lang::operator::UnaryOp;

    fn ops(chunk: &Chunk) -> Vec<Op> {
        chunk.decode_all().unwrap().iter().map(|i| i.op).collect()
    }

    fn compile_stmts(stmts: Vec<Stmt>) -> Chunk {
        compile(&Program::new(stmts)).unwrap()
    }

    #[test]
    fn test_print_arithmetic_layout() {
        let chunk = compile_stmts(vec![Stmt::print(vec![Expr::binary(
            BinaryOp::Add,
            Expr::int(1),
            Expr::binary(BinaryOp::Mul, Expr::int(2), Expr::int(3)),
        )])]);

        assert_eq!(
            ops(&chunk),
            vec![
                Op::Push,
                Op::Push,
                Op::Push,
                Op::Mul,
                Op::Add,
                Op::Print,
                Op::Halt
            ]
        );
        assert_eq!(
            chunk.constants,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn test_empty_program_is_just_halt() {
        let chunk = compile_stmts(vec![]);
        assert_eq!(ops(&chunk), vec![Op::Halt]);
    }

    #[test]
    fn test_global_declaration_sets_and_pops() {
        let chunk = compile_stmts(vec![Stmt::let_decl("x", Expr::int(1))]);
        assert_eq!(ops(&chunk), vec![Op::Push, Op::Set, Op::Pop, Op::Halt]);
    }

    #[test]
    fn test_top_level_block_uses_runtime_scope() {
        let chunk = compile_stmts(vec![Stmt::block(vec![
            Stmt::let_decl("x", Expr::int(1)),
            Stmt::print(vec![Expr::ident("x")]),
        ])]);

        assert_eq!(
            ops(&chunk),
            vec![
                Op::OpenScope,
                Op::Push,
                Op::Define,
                Op::Pop,
                Op::Get,
                Op::Print,
                Op::CloseScope,
                Op::Halt
            ]
        );
    }

    #[test]
    fn test_function_params_and_locals_use_slots() {
        let chunk = compile_stmts(vec![Stmt::function(
            "add",
            &["a", "b"],
            vec![
                Stmt::let_decl("c", Expr::binary(BinaryOp::Add, Expr::ident("a"), Expr::ident("b"))),
                Stmt::ret(Some(Expr::ident("c"))),
            ],
        )]);

        let decoded = chunk.decode_all().unwrap();
        let listing: Vec<(Op, Vec<u16>)> = decoded
            .iter()
            .map(|i| (i.op, i.operands().to_vec()))
            .collect();

        assert_eq!(listing[0].0, Op::Jump);
        assert_eq!(listing[1], (Op::GetLocal, vec![0]));
        assert_eq!(listing[2], (Op::GetLocal, vec![1]));
        assert_eq!(listing[3], (Op::Add, vec![]));
        assert_eq!(listing[4], (Op::SetLocal, vec![2]));
        assert_eq!(listing[5], (Op::GetLocal, vec![2]));
        assert_eq!(listing[6], (Op::Return, vec![]));
        // implicit unit return
        assert_eq!(listing[7].0, Op::Push);
        assert_eq!(listing[8], (Op::Return, vec![]));

        let new_fn = &decoded[9];
        assert_eq!(new_fn.op, Op::NewFn);
        assert_eq!(new_fn.operand(0), 2);
        assert_eq!(new_fn.operand(1), decoded[1].offset);
        assert_eq!(chunk.name_at(new_fn.operand(2)), Some("add"));

        // skip-over jump lands on NewFn
        assert_eq!(decoded[0].operand(0), new_fn.offset);
        assert_eq!(verify(&chunk), Ok(()));
    }

    #[test]
    fn test_anon_fn_pushes_value_and_local_callee_uses_slot() {
        let chunk = compile_stmts(vec![Stmt::function(
            "twice",
            &["f", "x"],
            vec![Stmt::ret(Some(Expr::call(
                "f",
                vec![Expr::call("f", vec![Expr::ident("x")])],
            )))],
        ), Stmt::let_decl(
            "double",
            Expr::anon_fn(
                &["a"],
                vec![Stmt::ret(Some(Expr::binary(
                    BinaryOp::Mul,
                    Expr::ident("a"),
                    Expr::int(2),
                )))],
            ),
        )]);

        let decoded = chunk.decode_all().unwrap();
        let listing: Vec<(Op, Vec<u16>)> = decoded
            .iter()
            .map(|i| (i.op, i.operands().to_vec()))
            .collect();

        // `f` is parameter slot 0 of `twice`
        assert!(listing.contains(&(Op::CallLocal, vec![0, 1])));
        assert!(!listing.iter().any(|(op, _)| *op == Op::Call));

        let anon = decoded
            .iter()
            .find(|i| i.op == Op::NewAnonFn)
            .expect("anonymous function emitted");
        assert_eq!(anon.operand(0), 1);
        let entry = decoded
            .iter()
            .find(|i| i.offset == anon.operand(1))
            .expect("entry is an instruction");
        assert_eq!(entry.op, Op::GetLocal);

        // the value is bound like any other initializer
        let after: Vec<Op> = decoded
            .iter()
            .skip_while(|i| i.op != Op::NewAnonFn)
            .map(|i| i.op)
            .collect();
        assert_eq!(after, vec![Op::NewAnonFn, Op::Set, Op::Pop, Op::Halt]);
        assert_eq!(verify(&chunk), Ok(()));
    }

    #[test]
    fn test_nested_block_in_function_pops_its_locals() {
        let chunk = compile_stmts(vec![Stmt::function(
            "f",
            &[],
            vec![
                Stmt::let_decl("x", Expr::int(1)),
                Stmt::block(vec![
                    Stmt::let_decl("x", Expr::int(2)),
                    Stmt::let_decl("y", Expr::int(3)),
                    Stmt::print(vec![Expr::ident("x")]),
                ]),
                Stmt::print(vec![Expr::ident("x")]),
            ],
        )]);

        let listing: Vec<(Op, Vec<u16>)> = chunk
            .decode_all()
            .unwrap()
            .iter()
            .map(|i| (i.op, i.operands().to_vec()))
            .collect();

        assert!(listing.contains(&(Op::SetLocal, vec![1])));
        assert!(listing.contains(&(Op::SetLocal, vec![2])));
        assert!(listing.contains(&(Op::GetLocal, vec![1])));
        assert!(listing.contains(&(Op::PopN, vec![2])));
        assert!(listing.contains(&(Op::GetLocal, vec![0])));
    }

    #[test]
    fn test_compound_assignment_reads_then_writes() {
        let chunk = compile_stmts(vec![
            Stmt::var_decl("n", Expr::int(1)),
            Stmt::expr(Expr::compound(BinaryOp::Mul, "n", Expr::int(4))),
        ]);
        assert_eq!(
            ops(&chunk),
            vec![
                Op::Push,
                Op::Set,
                Op::Pop,
                Op::Get,
                Op::Push,
                Op::Mul,
                Op::Set,
                Op::Pop,
                Op::Halt
            ]
        );
    }

    #[test]
    fn test_identifier_constants_are_interned() {
        let chunk = compile_stmts(vec![
            Stmt::var_decl("n", Expr::int(1)),
            Stmt::expr(Expr::assign("n", Expr::ident("n"))),
        ]);
        let names = chunk
            .constants
            .iter()
            .filter(|c| c.as_name() == Some("n"))
            .count();
        assert_eq!(names, 1);
    }

    #[test]
    fn test_if_else_jumps_land_on_boundaries() {
        let chunk = compile_stmts(vec![Stmt::if_else(
            Expr::boolean(true),
            vec![Stmt::print(vec![Expr::int(1)])],
            Some(Stmt::if_else(
                Expr::boolean(false),
                vec![Stmt::print(vec![Expr::int(2)])],
                Some(Stmt::block(vec![Stmt::print(vec![Expr::int(3)])])),
            )),
        )]);
        assert_eq!(verify(&chunk), Ok(()));
    }

    #[test]
    fn test_while_back_edge_targets_condition() {
        let chunk = compile_stmts(vec![
            Stmt::var_decl("i", Expr::int(0)),
            Stmt::while_loop(
                Expr::binary(BinaryOp::Less, Expr::ident("i"), Expr::int(3)),
                vec![Stmt::expr(Expr::compound(BinaryOp::Add, "i", Expr::int(1)))],
            ),
        ]);

        let decoded = chunk.decode_all().unwrap();
        let head = decoded[3].offset;
        let back_edge = decoded
            .iter()
            .rev()
            .find(|i| i.op == Op::Jump)
            .unwrap();
        assert_eq!(back_edge.operand(0), head);
        assert_eq!(verify(&chunk), Ok(()));
    }

    #[test]
    fn test_break_in_function_unwinds_slots() {
        let chunk = compile_stmts(vec![Stmt::function(
            "f",
            &[],
            vec![Stmt::while_loop(
                Expr::boolean(true),
                vec![Stmt::let_decl("t", Expr::int(1)), Stmt::brk()],
            )],
        )]);

        let listing: Vec<Op> = ops(&chunk);
        let set = listing.iter().position(|op| *op == Op::SetLocal).unwrap();
        assert_eq!(&listing[set + 1..set + 3], &[Op::Pop, Op::Jump]);
        assert_eq!(verify(&chunk), Ok(()));
    }

    #[test]
    fn test_break_at_top_level_closes_scopes() {
        let chunk = compile_stmts(vec![Stmt::while_loop(
            Expr::boolean(true),
            vec![Stmt::block(vec![Stmt::brk()])],
        )]);

        let listing = ops(&chunk);
        let close = listing.iter().position(|op| *op == Op::CloseScope).unwrap();
        // two scopes (body + inner block) closed before the jump
        assert_eq!(&listing[close..close + 3], &[Op::CloseScope, Op::CloseScope, Op::Jump]);
    }

    #[test]
    fn test_misplaced_control_flow_rejected() {
        let err = compile(&Program::new(vec![Stmt::brk()])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidPosition { kind: TokenKind::Break, .. }));

        let err = compile(&Program::new(vec![Stmt::ret(None)])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidPosition { kind: TokenKind::Return, .. }));
    }

    #[test]
    fn test_break_does_not_cross_function_boundary() {
        let program = Program::new(vec![Stmt::while_loop(
            Expr::boolean(true),
            vec![Stmt::function("f", &[], vec![Stmt::brk()])],
        )]);
        assert!(matches!(
            compile(&program),
            Err(CompileError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn test_invalid_literal_names_lexeme() {
        let token = Token::new(TokenKind::Int, "99999999999", 2, 5);
        let err = compile(&Program::new(vec![Stmt::print(vec![Expr::Literal(token)])]))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidLiteral {
                lexeme: "99999999999".to_string(),
                kind: TokenKind::Int,
                position: Position::new(2, 5),
            }
        );
    }

    #[test]
    fn test_non_literal_token_is_unhandled() {
        let token = Token::synthetic(TokenKind::Plus, "+");
        let err = compile(&Program::new(vec![Stmt::expr(Expr::Literal(token))])).unwrap_err();
        assert!(matches!(err, CompileError::Unhandled { kind: TokenKind::Plus, .. }));
    }

    #[test]
    fn test_short_circuit_and_list_literal() {
        let chunk = compile_stmts(vec![Stmt::print(vec![
            Expr::binary(
                BinaryOp::And,
                Expr::boolean(false),
                Expr::unary(UnaryOp::Not, Expr::boolean(false)),
            ),
            Expr::list(vec![Expr::int(1), Expr::int(2)]),
        ])]);

        let listing = ops(&chunk);
        assert!(listing.contains(&Op::JumpFalse));
        assert!(listing.contains(&Op::Not));
        assert!(listing.contains(&Op::MakeList));
        assert_eq!(verify(&chunk), Ok(()));
    }

    #[test]
    fn test_positions_follow_tokens() {
        let print = Stmt::Print {
            token: Token::new(TokenKind::Print, "print", 4, 1),
            args: vec![Expr::Literal(Token::new(TokenKind::Int, "1", 4, 7))],
        };
        let chunk = compile_stmts(vec![print]);

        assert_eq!(chunk.position_at(0), Position::new(4, 7));
        assert_eq!(chunk.position_at(3), Position::new(4, 1));
    }
}
