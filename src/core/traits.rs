//! Core traits shared by the long-running simulation actors
//!
//! Transfer workers and consistency auditors are both driven the same way by
//! the orchestrator: one iteration at a time, with the stop condition checked
//! only between iterations.

use crate::types::BankError;

/// A repeatable unit of simulation work
pub trait Actor: Send {
    /// Name used in log fields and job failures
    fn name(&self) -> &str;

    /// Perform one complete iteration
    ///
    /// Recoverable outcomes (such as a skipped transfer) are handled inside
    /// the iteration. An `Err` is fatal for the whole run.
    fn iteration(&mut self) -> Result<(), BankError>;
}
