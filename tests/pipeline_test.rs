//! End-to-end tests: syntax tree in, bytecode through the VM, output out.

use tiny::bytecode::Op;
use tiny::lang::node::{Expr, Stmt, VarDecl};
use tiny::lang::operator::{BinaryOp, UnaryOp};
use tiny::lang::value::ValueError;
use tiny::runtime::{OutputBuffer, RuntimeErrorKind};
use tiny::{Chunk, Program, Value, Vm, compile};

// =============================================================================
// Helpers
// =============================================================================

struct Outcome {
    chunk: Chunk,
    vm: Vm,
    lines: Vec<String>,
}

fn run(stmts: Vec<Stmt>) -> Outcome {
    try_run(stmts).unwrap_or_else(|e| panic!("program failed: {}", e))
}

fn try_run(stmts: Vec<Stmt>) -> Result<Outcome, tiny::Error> {
    let buffer = OutputBuffer::new();
    let mut vm = Vm::new().with_output(buffer.clone());
    let chunk = tiny::run(&Program::new(stmts), &mut vm)?;
    Ok(Outcome {
        chunk,
        vm,
        lines: buffer.lines(),
    })
}

fn runtime_error(stmts: Vec<Stmt>) -> RuntimeErrorKind {
    match try_run(stmts) {
        Err(tiny::Error::Runtime(e)) => e.kind,
        Err(other) => panic!("expected a runtime error, got {}", other),
        Ok(out) => panic!("expected a runtime error, program printed {:?}", out.lines),
    }
}

/// Invariants every successful run must hold.
fn assert_balanced(out: &Outcome) {
    assert!(
        out.vm.stack().is_empty(),
        "stack not empty after halt: {:?}",
        out.vm.stack()
    );

    let stats = out.vm.stats();
    assert_eq!(stats.frames_pushed, stats.frames_popped, "frame push/pop");
    assert_eq!(stats.scopes_pushed, stats.scopes_popped, "scope push/pop");
    assert_eq!(out.vm.frame_depth(), 1);
    assert_eq!(out.vm.scope_depth(), 0);

    let instructions = out.chunk.decode_all().expect("decodes");
    let boundaries: Vec<usize> = instructions.iter().map(|i| i.offset).collect();
    for ins in &instructions {
        if let Some(index) = ins.op.target_operand() {
            let target = ins.operand(index);
            assert!(
                boundaries.contains(&target),
                "{} at {} targets mid-instruction byte {}",
                ins.op,
                ins.offset,
                target
            );
        }
    }
}

fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

fn fib_function() -> Stmt {
    let n = || Expr::ident("n");
    Stmt::function(
        "fib",
        &["n"],
        vec![
            Stmt::if_else(
                bin(BinaryOp::Less, n(), Expr::int(2)),
                vec![Stmt::ret(Some(n()))],
                None,
            ),
            Stmt::ret(Some(bin(
                BinaryOp::Add,
                Expr::call("fib", vec![bin(BinaryOp::Sub, n(), Expr::int(1))]),
                Expr::call("fib", vec![bin(BinaryOp::Sub, n(), Expr::int(2))]),
            ))),
        ],
    )
}

// =============================================================================
// Arithmetic
// =============================================================================

#[test]
fn test_precedence_example_prints_seven() {
    let out = run(vec![Stmt::print(vec![bin(
        BinaryOp::Add,
        Expr::int(1),
        bin(BinaryOp::Mul, Expr::int(2), Expr::int(3)),
    )])]);

    let ops: Vec<Op> = out
        .chunk
        .decode_all()
        .unwrap()
        .iter()
        .map(|i| i.op)
        .collect();
    assert_eq!(
        ops,
        vec![Op::Push, Op::Push, Op::Push, Op::Mul, Op::Add, Op::Print, Op::Halt]
    );
    assert_eq!(out.lines, vec!["7"]);
    assert_balanced(&out);
}

#[test]
fn test_value_arithmetic() {
    assert_eq!(
        Value::binop_int(BinaryOp::Add, 2, 3).unwrap(),
        Value::Int(5)
    );
    assert_eq!(
        Value::binop_float(BinaryOp::Div, 6.0, 2.0).unwrap(),
        Value::Float(3.0)
    );
}

#[test]
fn test_float_and_string_output() {
    let out = run(vec![
        Stmt::print(vec![bin(BinaryOp::Div, Expr::float(6.0), Expr::float(2.0))]),
        Stmt::print(vec![bin(
            BinaryOp::Add,
            Expr::string("ti"),
            Expr::string("ny"),
        )]),
        Stmt::print(vec![Expr::unary(UnaryOp::Negate, Expr::int(4))]),
        Stmt::print(vec![Expr::unary(UnaryOp::Not, Expr::boolean(false))]),
        Stmt::print(vec![Expr::unit()]),
    ]);
    assert_eq!(out.lines, vec!["3.000000", "tiny", "-4", "true", "()"]);
    assert_balanced(&out);
}

#[test]
fn test_mixed_operands_are_rejected() {
    let kind = runtime_error(vec![Stmt::print(vec![bin(
        BinaryOp::Add,
        Expr::int(1),
        Expr::float(2.0),
    )])]);
    assert_eq!(
        kind,
        RuntimeErrorKind::Value(ValueError::TypeMismatch {
            left: "int",
            op: "+",
            right: "float",
        })
    );
}

#[test]
fn test_division_by_zero() {
    let kind = runtime_error(vec![Stmt::print(vec![bin(
        BinaryOp::Div,
        Expr::int(1),
        Expr::int(0),
    )])]);
    assert_eq!(kind, RuntimeErrorKind::Value(ValueError::DivisionByZero));
}

// =============================================================================
// Scoping
// =============================================================================

#[test]
fn test_top_level_block_shadowing() {
    let out = run(vec![Stmt::block(vec![
        Stmt::let_decl("x", Expr::int(1)),
        Stmt::block(vec![
            Stmt::let_decl("x", Expr::int(2)),
            Stmt::print(vec![Expr::ident("x")]),
        ]),
        Stmt::print(vec![Expr::ident("x")]),
    ])]);

    assert_eq!(out.lines, vec!["2", "1"]);
    assert_eq!(out.vm.stats().scopes_pushed, 2);
    assert_eq!(out.vm.global("x"), None);
    assert_balanced(&out);
}

#[test]
fn test_function_block_shadowing() {
    let out = run(vec![
        Stmt::function(
            "f",
            &[],
            vec![
                Stmt::let_decl("x", Expr::int(1)),
                Stmt::block(vec![
                    Stmt::let_decl("x", Expr::int(2)),
                    Stmt::print(vec![Expr::ident("x")]),
                ]),
                Stmt::print(vec![Expr::ident("x")]),
            ],
        ),
        Stmt::expr(Expr::call("f", vec![])),
    ]);

    assert_eq!(out.lines, vec!["2", "1"]);
    assert_eq!(out.vm.stats().scopes_pushed, 0);
    assert_balanced(&out);
}

#[test]
fn test_assignment_reaches_enclosing_scope() {
    let out = run(vec![
        Stmt::var_decl("total", Expr::int(0)),
        Stmt::block(vec![
            Stmt::let_decl("step", Expr::int(5)),
            Stmt::expr(Expr::compound(BinaryOp::Add, "total", Expr::ident("step"))),
        ]),
        Stmt::print(vec![Expr::ident("total")]),
    ]);

    assert_eq!(out.lines, vec!["5"]);
    assert_eq!(out.vm.global("total"), Some(&Value::Int(5)));
    assert_balanced(&out);
}

// =============================================================================
// Functions
// =============================================================================

#[test]
fn test_call_leaves_one_value() {
    let mut chunk = compile(&Program::new(vec![
        Stmt::function(
            "add",
            &["a", "b"],
            vec![Stmt::ret(Some(bin(
                BinaryOp::Add,
                Expr::ident("a"),
                Expr::ident("b"),
            )))],
        ),
        Stmt::expr(Expr::call("add", vec![Expr::int(2), Expr::int(3)])),
    ]))
    .unwrap();

    // stop right after the call instead of discarding its result
    let pop = chunk
        .decode_all()
        .unwrap()
        .into_iter()
        .rev()
        .find(|i| i.op == Op::Pop)
        .expect("expression statement pops its value");
    chunk.instructions[pop.offset] = Op::Halt.byte();

    let mut vm = Vm::new().with_output(OutputBuffer::new());
    vm.run(&chunk).unwrap();

    assert_eq!(vm.stack(), &[Value::Int(5)]);
    assert_eq!(vm.frame_depth(), 1);
    assert_eq!(vm.stats().frames_pushed, 1);
    assert_eq!(vm.stats().frames_popped, 1);
}

#[test]
fn test_recursion() {
    let out = run(vec![
        fib_function(),
        Stmt::print(vec![Expr::call("fib", vec![Expr::int(15)])]),
    ]);
    assert_eq!(out.lines, vec!["610"]);
    assert_balanced(&out);
}

#[test]
fn test_anonymous_function_bound_and_called() {
    // let f = fn(a) { return a * 2; }; print(f(4));
    let out = run(vec![
        Stmt::let_decl(
            "f",
            Expr::anon_fn(
                &["a"],
                vec![Stmt::ret(Some(bin(BinaryOp::Mul, Expr::ident("a"), Expr::int(2))))],
            ),
        ),
        Stmt::print(vec![Expr::call("f", vec![Expr::int(4)])]),
    ]);
    assert_eq!(out.lines, vec!["8"]);
    let instructions = out.chunk.decode_all().expect("decodes");
    assert!(instructions.iter().any(|ins| ins.op == Op::NewAnonFn));
    assert_balanced(&out);
}

#[test]
fn test_value_less_return_yields_unit() {
    let out = run(vec![
        Stmt::function(
            "early",
            &["flag"],
            vec![
                Stmt::if_else(Expr::ident("flag"), vec![Stmt::ret(None)], None),
                Stmt::ret(Some(Expr::int(1))),
            ],
        ),
        Stmt::print(vec![Expr::call("early", vec![Expr::boolean(true)])]),
        Stmt::print(vec![Expr::call("early", vec![Expr::boolean(false)])]),
    ]);
    assert_eq!(out.lines, vec!["()", "1"]);
    assert_balanced(&out);
}

#[test]
fn test_arguments_are_copies() {
    let out = run(vec![
        Stmt::function(
            "grow",
            &["xs"],
            vec![
                Stmt::expr(Expr::compound(
                    BinaryOp::Add,
                    "xs",
                    Expr::list(vec![Expr::int(9)]),
                )),
                Stmt::ret(Some(Expr::ident("xs"))),
            ],
        ),
        Stmt::let_decl("xs", Expr::list(vec![Expr::int(1)])),
        Stmt::print(vec![Expr::call("grow", vec![Expr::ident("xs")])]),
        Stmt::print(vec![Expr::ident("xs")]),
    ]);
    assert_eq!(out.lines, vec!["[1, 9]", "[1]"]);
    assert_balanced(&out);
}

#[test]
fn test_wrong_argument_count() {
    let kind = runtime_error(vec![
        Stmt::function("one", &["a"], vec![Stmt::ret(Some(Expr::ident("a")))]),
        Stmt::print(vec![Expr::call("one", vec![])]),
    ]);
    assert_eq!(
        kind,
        RuntimeErrorKind::WrongArity {
            name: "one".to_string(),
            expected: 1,
            got: 0,
        }
    );
}

#[test]
fn test_host_natives() {
    let buffer = OutputBuffer::new();
    let mut vm = Vm::new().with_output(buffer.clone());
    vm.define_native("max", 2, |args| match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.max(b))),
        _ => Err("max expects two ints".to_string()),
    });
    vm.define_global("limit", Value::Int(7));

    let program = Program::new(vec![Stmt::print(vec![Expr::call(
        "max",
        vec![Expr::int(3), Expr::ident("limit")],
    )])]);
    tiny::run(&program, &mut vm).unwrap();

    assert_eq!(buffer.lines(), vec!["7"]);
    assert!(vm.stack().is_empty());
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn test_while_loop_counts() {
    let out = run(vec![
        Stmt::var_decl("i", Expr::int(0)),
        Stmt::while_loop(
            bin(BinaryOp::Less, Expr::ident("i"), Expr::int(3)),
            vec![
                Stmt::print(vec![Expr::ident("i")]),
                Stmt::expr(Expr::assign(
                    "i",
                    bin(BinaryOp::Add, Expr::ident("i"), Expr::int(1)),
                )),
            ],
        ),
    ]);
    assert_eq!(out.lines, vec!["0", "1", "2"]);
    assert_balanced(&out);
}

#[test]
fn test_if_else_chain() {
    let classify = |n: i32| {
        Stmt::if_else(
            bin(BinaryOp::Less, Expr::int(n), Expr::int(0)),
            vec![Stmt::print(vec![Expr::string("negative")])],
            Some(Stmt::if_else(
                bin(BinaryOp::EqEq, Expr::int(n), Expr::int(0)),
                vec![Stmt::print(vec![Expr::string("zero")])],
                Some(Stmt::block(vec![Stmt::print(vec![Expr::string(
                    "positive",
                )])])),
            )),
        )
    };

    let out = run(vec![classify(-1), classify(0), classify(1)]);
    assert_eq!(out.lines, vec!["negative", "zero", "positive"]);
    assert_balanced(&out);
}

#[test]
fn test_for_loop_with_break_and_continue() {
    let i = || Expr::ident("i");
    let body = vec![
        Stmt::let_decl("half", bin(BinaryOp::Div, i(), Expr::int(2))),
        Stmt::if_else(
            bin(
                BinaryOp::EqEq,
                bin(BinaryOp::Mul, Expr::ident("half"), Expr::int(2)),
                i(),
            ),
            vec![Stmt::cont()],
            None,
        ),
        Stmt::if_else(
            bin(BinaryOp::Greater, i(), Expr::int(6)),
            vec![Stmt::brk()],
            None,
        ),
        Stmt::print(vec![i()]),
    ];
    let loop_stmt = || {
        Stmt::for_loop(
            Some(VarDecl::new("i", true, Expr::int(0))),
            bin(BinaryOp::Less, i(), Expr::int(100)),
            Some(Expr::compound(BinaryOp::Add, "i", Expr::int(1))),
            body.clone(),
        )
    };

    // once at top level (runtime scopes), once inside a function (slots)
    let out = run(vec![
        loop_stmt(),
        Stmt::function("odd", &[], vec![loop_stmt()]),
        Stmt::expr(Expr::call("odd", vec![])),
    ]);
    assert_eq!(out.lines, vec!["1", "3", "5", "1", "3", "5"]);
    assert_balanced(&out);
}

#[test]
fn test_condition_must_be_bool() {
    let kind = runtime_error(vec![Stmt::if_else(Expr::int(1), vec![], None)]);
    assert_eq!(kind, RuntimeErrorKind::ConditionNotBool("int"));
}

#[test]
fn test_break_outside_loop_is_a_compile_error() {
    assert!(matches!(
        try_run(vec![Stmt::brk()]),
        Err(tiny::Error::Compile(_))
    ));
}

// =============================================================================
// Persisted bytecode
// =============================================================================

#[test]
fn test_saved_chunk_runs_the_same() {
    let program = Program::new(vec![
        fib_function(),
        Stmt::print(vec![
            Expr::string("fib(10) = "),
            Expr::call("fib", vec![Expr::int(10)]),
        ]),
    ]);
    let chunk = compile(&program).unwrap();

    let mut file = Vec::new();
    chunk.write_to(&mut file).unwrap();
    let loaded = Chunk::read_from(file.as_slice()).unwrap();
    assert_eq!(loaded, chunk);

    let buffer = OutputBuffer::new();
    Vm::new()
        .with_output(buffer.clone())
        .run(&loaded)
        .unwrap();
    assert_eq!(buffer.lines(), vec!["fib(10) = 55"]);
}
