//! Loading-flag guard with a generation counter.
//!
//! At most one invocation per guard is in flight. A second [`begin`] while
//! loading is refused rather than queued. [`reset`] starts a new
//! generation: tickets issued before it are no longer current, so results
//! that arrive after a reset can be recognised and dropped.
//!
//! [`begin`]: InvocationGuard::begin
//! [`reset`]: InvocationGuard::reset

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::CoreError;

#[derive(Debug, Default)]
struct GuardState {
    in_flight: AtomicBool,
    generation: AtomicU64,
}

/// Cheaply cloneable handle; clones share the same flag and generation.
#[derive(Debug, Clone, Default)]
pub struct InvocationGuard {
    state: Arc<GuardState>,
}

/// Proof that the holder started the in-flight invocation.
///
/// Dropping the ticket clears the loading flag, unless the guard has been
/// reset since the ticket was issued.
#[derive(Debug)]
pub struct Ticket {
    state: Arc<GuardState>,
    generation: u64,
}

impl InvocationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an invocation as in flight.
    pub fn begin(&self) -> Result<Ticket, CoreError> {
        self.state
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CoreError::Conflict("An invocation is already in flight".to_string()))?;

        Ok(Ticket {
            state: Arc::clone(&self.state),
            generation: self.state.generation.load(Ordering::Acquire),
        })
    }

    pub fn is_loading(&self) -> bool {
        self.state.in_flight.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::Acquire)
    }

    /// Invalidate outstanding tickets and clear the loading flag.
    pub fn reset(&self) {
        self.state.generation.fetch_add(1, Ordering::AcqRel);
        self.state.in_flight.store(false, Ordering::Release);
    }
}

impl Ticket {
    /// Whether no reset happened since this ticket was issued.
    pub fn is_current(&self) -> bool {
        self.state.generation.load(Ordering::Acquire) == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.is_current() {
            self.state.in_flight.store(false, Ordering::Release);
        }
    }
}
