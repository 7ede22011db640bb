//! "Find more" search sessions.
//!
//! A session remembers the last submitted inputs and every output batch
//! returned so far. Each follow-up request excludes the earlier batches,
//! so follow-ups are serialized through the session's [`InvocationGuard`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::CoreError;
use crate::guard::{InvocationGuard, Ticket};
use crate::workflow::{exclusion_input, WorkflowInput, WorkflowRequest};

/// An invocation that has been admitted by the guard.
#[derive(Debug)]
pub struct PendingInvocation {
    pub ticket: Ticket,
    pub request: WorkflowRequest,
}

#[derive(Debug, Default)]
struct SessionState {
    last_inputs: Option<Vec<WorkflowInput>>,
    last_request: Option<WorkflowRequest>,
    batches: Vec<String>,
}

#[derive(Debug)]
pub struct FindMoreSession {
    deployment: String,
    guard: InvocationGuard,
    state: Mutex<SessionState>,
}

impl FindMoreSession {
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            guard: InvocationGuard::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn guard(&self) -> &InvocationGuard {
        &self.guard
    }

    /// Start a fresh search, discarding earlier batches.
    pub fn begin_search(&self, inputs: Vec<WorkflowInput>) -> Result<PendingInvocation, CoreError> {
        let ticket = self.guard.begin()?;
        let request = WorkflowRequest::new(self.deployment.clone(), inputs.clone());
        request.validate()?;

        let mut state = self.lock();
        state.batches.clear();
        state.last_inputs = Some(inputs);
        state.last_request = Some(request.clone());

        Ok(PendingInvocation { ticket, request })
    }

    /// Ask for more results, excluding every batch received so far.
    pub fn begin_find_more(&self) -> Result<PendingInvocation, CoreError> {
        let ticket = self.guard.begin()?;

        let mut state = self.lock();
        let mut inputs = state.last_inputs.clone().ok_or_else(|| {
            CoreError::Validation("Submit a search before asking for more".to_string())
        })?;
        inputs.extend(exclusion_input(&state.batches));

        let request = WorkflowRequest::new(self.deployment.clone(), inputs);
        state.last_request = Some(request.clone());

        Ok(PendingInvocation { ticket, request })
    }

    /// Re-issue the last request unchanged (the retry affordance).
    pub fn begin_retry(&self) -> Result<PendingInvocation, CoreError> {
        let ticket = self.guard.begin()?;
        let request = self
            .lock()
            .last_request
            .clone()
            .ok_or_else(|| CoreError::Validation("Nothing to retry".to_string()))?;

        Ok(PendingInvocation { ticket, request })
    }

    /// Record a returned batch. Returns `false` (and records nothing) when
    /// the session was reset while the invocation was in flight.
    pub fn complete(&self, pending: PendingInvocation, batch: String) -> bool {
        if !pending.ticket.is_current() {
            return false;
        }
        self.lock().batches.push(batch);
        true
    }

    /// Forget inputs and batches, and invalidate any in-flight invocation.
    pub fn reset(&self) {
        self.guard.reset();
        *self.lock() = SessionState::default();
    }

    pub fn batches(&self) -> Vec<String> {
        self.lock().batches.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
