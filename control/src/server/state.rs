//! Server state

use std::sync::Arc;

use crate::remote::Orchestrator;
use crate::runner::ProcessRunner;

/// Server state shared across handlers
pub struct ServerState {
    pub runner: Arc<ProcessRunner>,
    pub orchestrator: Arc<Orchestrator>,
}

impl ServerState {
    pub fn new(runner: Arc<ProcessRunner>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            runner,
            orchestrator,
        }
    }
}
