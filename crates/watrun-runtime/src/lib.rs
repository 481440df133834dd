//! Sandboxed execution of compiled WAT test modules.
//!
//! This crate instantiates a compiled module against four host primitives
//! (character input, character output, sparse word-addressed memory read and
//! write) and invokes its exported `main`. Modules use either a 32-bit or a
//! 64-bit word uniformly for memory addresses, memory values, and the entry
//! point result; nothing in the binary announces which, so the executor
//! discovers the width by trial instantiation.

pub mod executor;
pub mod host;
pub mod memory;

pub use executor::{execute, AbiVariant, ExecutionResult, ExecutorError, ReturnValue};
pub use host::HostState;
pub use memory::SparseMemory;
