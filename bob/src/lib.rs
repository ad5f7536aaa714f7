//! Bob - run build commands concurrently on a bounded set of slots.
//!
//! Commands run attached to a pseudo-terminal so their output stays line
//! buffered, and every command's output can be captured for reporting once
//! the batch is done.

pub mod error;
pub mod models;
pub mod process;
