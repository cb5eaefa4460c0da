/// Run-time record of one function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Where to resume the caller; `None` for the top-level frame.
    pub return_address: Option<usize>,
    /// First operand-stack slot owned by this call (its first argument).
    pub stack_base: usize,
    /// Runtime scopes that were open when the call began.
    pub scope_floor: usize,
    pub name: String,
}

impl Frame {
    pub fn top_level() -> Self {
        Frame {
            return_address: None,
            stack_base: 0,
            scope_floor: 1,
            name: "<main>".to_string(),
        }
    }

    pub fn call(name: &str, return_address: usize, stack_base: usize, scope_floor: usize) -> Self {
        Frame {
            return_address: Some(return_address),
            stack_base,
            scope_floor,
            name: name.to_string(),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.return_address.is_none()
    }
}
