//! Legacy position manager guard (SPEC_FULL.md §4.8). The pre-state-machine
//! position manager (grounded in the teacher's
//! `application::risk_management::position_manager::PositionManager`) is kept in the
//! workspace as a fallback path, but it must never run against a live account: it
//! predates the reconciliation and shock-guard protections and has no awareness of
//! them. Construction fails outright in `Environment::Prod`.

use crate::config::Environment;
use crate::domain::errors::ExecutionError;

/// Pending-order/trailing-stop tracking identical in shape to the teacher's
/// `PositionManager`, retained for `dev`/`staging` comparison runs against the
/// state machine in [`crate::execution::state_machine`].
pub struct LegacyPositionManager {
    pending_order: Option<crate::domain::order::Side>,
    pending_order_timestamp_ms: i64,
}

impl LegacyPositionManager {
    /// Refuses to construct in production; the state machine is the only execution
    /// path allowed to run there.
    pub fn new(environment: Environment) -> Result<Self, ExecutionError> {
        if environment == Environment::Prod {
            return Err(ExecutionError::LegacyPathDisabled);
        }
        Ok(Self { pending_order: None, pending_order_timestamp_ms: 0 })
    }

    pub fn set_pending_order(&mut self, side: crate::domain::order::Side, timestamp_ms: i64) {
        self.pending_order = Some(side);
        self.pending_order_timestamp_ms = timestamp_ms;
    }

    pub fn clear_pending(&mut self) {
        self.pending_order = None;
        self.pending_order_timestamp_ms = 0;
    }

    pub fn check_timeout(&self, current_time_ms: i64, ttl_ms: i64) -> bool {
        self.pending_order.is_some() && current_time_ms - self.pending_order_timestamp_ms > ttl_ms
    }
}
