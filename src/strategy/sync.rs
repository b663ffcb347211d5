//! Thread-per-job execution strategy
//!
//! Each job gets its own named OS thread. Jobs block freely on account locks;
//! the operating system schedules them preemptively.

use crate::core::orchestrator::{Job, JobOutcome};
use crate::strategy::{panic_message, ExecutionStrategy};
use crate::types::BankError;
use std::thread;

/// Runs every job on a dedicated OS thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadStrategy;

impl ExecutionStrategy for ThreadStrategy {
    fn execute(&self, jobs: Vec<Job>) -> Vec<Result<JobOutcome, BankError>> {
        // Spawn everything before joining anything
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let spawned = thread::Builder::new().name(job.name.clone()).spawn(job.run);
                (job.name, spawned)
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, spawned)| match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|payload| {
                    Err(BankError::job_failed(&name, panic_message(payload.as_ref())))
                }),
                Err(e) => Err(BankError::job_failed(
                    &name,
                    format!("Failed to spawn thread: {}", e),
                )),
            })
            .collect()
    }
}
