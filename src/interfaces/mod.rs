//! Input and output adapters for the command-line runner.

pub mod csv;
pub mod json;
