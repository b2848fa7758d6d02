//! Bounded-concurrency external command execution

pub mod command;
pub mod gate;
pub mod messages;
pub mod process;

pub use command::{CommandRequest, CommandResult, RunOptions};
pub use gate::ConcurrencyGate;
pub use process::{ProcessRunner, RunnerOptions};
