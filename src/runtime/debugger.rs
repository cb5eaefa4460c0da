use std::io::{self, BufRead, BufReader, Write};

/// What the user asked for at a step prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCommand {
    Continue,
    /// Restart from instruction 0 with fresh state.
    Reset,
    Exit,
}

/// Line-oriented step prompt, read between instructions on the VM thread.
pub struct StepDebugger {
    input: Box<dyn BufRead>,
    /// Set once input is exhausted; the program then runs to completion.
    detached: bool,
}

impl StepDebugger {
    pub fn new(input: impl BufRead + 'static) -> Self {
        Self {
            input: Box::new(input),
            detached: false,
        }
    }

    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Print `>> ` and read one command.
    pub fn prompt(&mut self, out: &mut dyn Write) -> io::Result<StepCommand> {
        if self.detached {
            return Ok(StepCommand::Continue);
        }

        write!(out, ">> ")?;
        out.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            self.detached = true;
            return Ok(StepCommand::Continue);
        }

        Ok(match line.trim() {
            "reset" => StepCommand::Reset,
            "exit" => StepCommand::Exit,
            _ => StepCommand::Continue,
        })
    }
}
