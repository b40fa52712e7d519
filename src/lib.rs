//! Compiles communicating-process descriptions into locked C race harnesses.

pub mod cfir;
pub mod codegen;
pub mod config;
pub mod error;
pub mod mutex;
pub mod pipeline;
pub mod rhir;
pub mod stir;
pub mod subprocess;
