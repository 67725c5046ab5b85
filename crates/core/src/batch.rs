use crate::domain::request::RequestId;
use crate::errors::EngineError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchFailure {
    pub request_id: RequestId,
    pub error: EngineError,
}

/// Aggregate outcome of a batch operation. `succeeded < requested` is a
/// normal outcome, not an error: ineligible items are silently excluded and
/// per-item failures are listed without aborting siblings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchResult {
    pub requested: usize,
    pub succeeded: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn new(requested: usize) -> Self {
        Self { requested, succeeded: 0, failures: Vec::new() }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, request_id: RequestId, error: EngineError) {
        self.failures.push(BatchFailure { request_id, error });
    }

    pub fn fully_succeeded(&self) -> bool {
        self.succeeded == self.requested
    }

    /// Items excluded before processing or failed during it.
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.succeeded)
    }
}
