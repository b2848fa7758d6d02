//! Step ledger for remote deployments
//!
//! Each workflow step is a small state machine (`pending -> running ->
//! done|error`). The ledger only ever appends records and advances the status
//! of the last one, so it can be returned as-is on both success and failure.

use serde::{Deserialize, Serialize};

/// Status of a single workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl StepStatus {
    /// Validate a status transition
    pub fn advance(self, next: StepStatus) -> Result<StepStatus, String> {
        match (self, next) {
            (StepStatus::Pending, StepStatus::Running)
            | (StepStatus::Running, StepStatus::Done)
            | (StepStatus::Running, StepStatus::Error) => Ok(next),
            (from, to) => Err(format!("Invalid step transition: {:?} -> {:?}", from, to)),
        }
    }
}

/// One entry of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    step: String,
    status: StepStatus,
}

impl StepRecord {
    fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Pending,
        }
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    fn advance(&mut self, next: StepStatus) -> Result<(), String> {
        self.status = self.status.advance(next)?;
        Ok(())
    }
}

/// Ordered log of workflow steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepLedger {
    records: Vec<StepRecord>,
}

impl StepLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and mark it running.
    ///
    /// Rejected while another step is still running, or once a step has failed.
    pub fn begin(&mut self, step: impl Into<String>) -> Result<(), String> {
        let step = step.into();
        if let Some(last) = self.records.last() {
            match last.status {
                StepStatus::Pending | StepStatus::Running => {
                    return Err(format!(
                        "Cannot begin \"{}\": \"{}\" has not finished",
                        step, last.step
                    ));
                }
                StepStatus::Error => {
                    return Err(format!(
                        "Cannot begin \"{}\": \"{}\" already failed",
                        step, last.step
                    ));
                }
                StepStatus::Done => {}
            }
        }

        let mut record = StepRecord::new(step);
        record.advance(StepStatus::Running)?;
        self.records.push(record);
        Ok(())
    }

    /// Mark the running step as done
    pub fn complete(&mut self) -> Result<(), String> {
        self.finish(StepStatus::Done)
    }

    /// Mark the running step as failed
    pub fn fail(&mut self) -> Result<(), String> {
        self.finish(StepStatus::Error)
    }

    fn finish(&mut self, status: StepStatus) -> Result<(), String> {
        match self.records.last_mut() {
            Some(record) => record.advance(status),
            None => Err("No step has been started".to_string()),
        }
    }

    /// The step currently running, if any
    pub fn current(&self) -> Option<&StepRecord> {
        self.records
            .last()
            .filter(|record| record.status == StepStatus::Running)
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_failed(&self) -> bool {
        self.records
            .last()
            .is_some_and(|record| record.status == StepStatus::Error)
    }

    /// True when every recorded step is done
    pub fn all_done(&self) -> bool {
        self.records.iter().all(|record| record.status == StepStatus::Done)
    }
}
