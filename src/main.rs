//! tiny CLI: run, disassemble or emit compiled `.tbc` bytecode.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tiny::bytecode::disasm::print_chunk;
use tiny::lang::node::{Expr, Stmt, VarDecl};
use tiny::lang::operator::BinaryOp;
use tiny::runtime::StepDebugger;
use tiny::{Chunk, Error, Program, Vm, compile};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tiny", version, about = "Bytecode compiler and VM for tiny")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a compiled bytecode file
    Run {
        file: PathBuf,

        /// Print the disassembly before running
        #[arg(long)]
        disasm: bool,

        /// Pause after every instruction (`reset`, `exit`, or enter to step)
        #[arg(long)]
        step: bool,
    },

    /// Print the disassembly of a compiled bytecode file
    Disasm { file: PathBuf },

    /// Compile and run the built-in sample program
    Demo {
        /// Also write the compiled chunk to this file
        #[arg(long)]
        emit: Option<PathBuf>,

        /// Print the disassembly before running
        #[arg(long)]
        disasm: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "tiny=debug" } else { "tiny=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Command) -> Result<(), Error> {
    match command {
        Command::Run { file, disasm, step } => {
            let chunk = load(&file)?;
            if disasm {
                print_chunk(&chunk);
            }

            let mut vm = Vm::new();
            if step {
                vm = vm.with_debugger(StepDebugger::stdin());
            }
            vm.run(&chunk)?;
        }

        Command::Disasm { file } => print_chunk(&load(&file)?),

        Command::Demo { emit, disasm } => {
            let chunk = compile(&sample_program())?;

            if let Some(path) = emit {
                chunk.write_to(File::create(&path).map_err(tiny::FormatError::from)?)?;
                info!(path = %path.display(), bytes = chunk.len(), "wrote chunk");
            }
            if disasm {
                print_chunk(&chunk);
            }

            Vm::new().run(&chunk)?;
        }
    }
    Ok(())
}

fn load(path: &Path) -> Result<Chunk, Error> {
    let file = File::open(path).map_err(tiny::FormatError::from)?;
    let chunk = Chunk::read_from(BufReader::new(file))?;
    info!(path = %path.display(), bytes = chunk.len(), "loaded chunk");
    Ok(chunk)
}

/// ```text
/// fn fib(n) { if n < 2 { return n; } return fib(n - 1) + fib(n - 2); }
/// for (let i = 0; i < 10; i += 1) { print("fib(", i, ") = ", fib(i)); }
/// ```
fn sample_program() -> Program {
    let n = || Expr::ident("n");
    let fib = |k: i32| {
        Expr::call(
            "fib",
            vec![Expr::binary(BinaryOp::Sub, n(), Expr::int(k))],
        )
    };

    Program::new(vec![
        Stmt::function(
            "fib",
            &["n"],
            vec![
                Stmt::if_else(
                    Expr::binary(BinaryOp::Less, n(), Expr::int(2)),
                    vec![Stmt::ret(Some(n()))],
                    None,
                ),
                Stmt::ret(Some(Expr::binary(BinaryOp::Add, fib(1), fib(2)))),
            ],
        ),
        Stmt::for_loop(
            Some(VarDecl::new("i", true, Expr::int(0))),
            Expr::binary(BinaryOp::Less, Expr::ident("i"), Expr::int(10)),
            Some(Expr::compound(BinaryOp::Add, "i", Expr::int(1))),
            vec![Stmt::print(vec![
                Expr::string("fib("),
                Expr::ident("i"),
                Expr::string(") = "),
                Expr::call("fib", vec![Expr::ident("i")]),
            ])],
        ),
    ])
}
