//! Remote deployment over SSH

pub mod ledger;
pub mod orchestrator;
pub mod output;
pub mod path;
pub mod ssh;
pub mod target;
pub mod transport;

pub use ledger::{StepLedger, StepRecord, StepStatus};
pub use orchestrator::{ConnectionReport, DeployReport, Orchestrator};
pub use target::{ConnectionRequest, DeployRequest, DeployTarget};
pub use transport::{ExecOutput, RemoteSession, RemoteTransport};
