//! Serializable results of a batch run.

mod report;
mod status;

pub use report::{BatchReport, CommandReport};
pub use status::CommandStatus;
