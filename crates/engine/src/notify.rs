use std::sync::{Arc, Mutex};

use payable_core::domain::request::{RequestId, RequestStatus};
use payable_core::workflow::WorkflowAction;

/// What happened, for whoever wants to tell the humans. Dispatch is
/// fire-and-forget: the engine never awaits delivery and a broken
/// dispatcher must not fail a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionNotice {
    pub request_id: RequestId,
    pub action: WorkflowAction,
    pub new_status: RequestStatus,
    pub actor_id: String,
}

pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notice: TransitionNotice);
}

/// Default dispatcher: transitions are observable through the audit stream
/// and the ledger even when nobody is notified.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDispatcher;

impl NotificationDispatcher for NoopDispatcher {
    fn dispatch(&self, _notice: TransitionNotice) {}
}

#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    notices: Arc<Mutex<Vec<TransitionNotice>>>,
}

impl RecordingDispatcher {
    pub fn notices(&self) -> Vec<TransitionNotice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, notice: TransitionNotice) {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}
