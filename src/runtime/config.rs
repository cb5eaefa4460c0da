/// Safety limits for one VM instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Operand stack capacity.
    pub max_stack_size: usize,
    /// Function frames, not counting the top-level frame.
    pub max_call_depth: usize,
    /// Nested runtime scopes opened by top-level blocks.
    pub max_scope_depth: usize,
    pub max_steps: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_stack_size: 256,
            max_call_depth: 256,
            max_scope_depth: 256,
            max_steps: None,
        }
    }
}
