/// Utility functions commonly used
pub mod disposal_stack;
pub use disposal_stack::DisposalStack;
