//! Outer surfaces: the operator desk (REPL) and the x-ui panel adapter.

pub mod repl;
pub mod xui;
