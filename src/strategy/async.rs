//! Tokio runtime execution strategy
//!
//! Jobs block on account locks, so they run through `spawn_blocking` rather
//! than as async tasks. The blocking pool is sized to the job count so every
//! job gets a thread at once.

use crate::core::orchestrator::{Job, JobOutcome};
use crate::strategy::{panic_message, ExecutionStrategy};
use crate::types::BankError;
use futures::future::join_all;
use tracing::warn;

/// Runs every job on a tokio multi-threaded runtime's blocking pool
#[derive(Debug, Clone)]
pub struct TokioStrategy {
    /// Worker threads of the runtime
    worker_threads: usize,
}

impl Default for TokioStrategy {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

impl TokioStrategy {
    /// Create a strategy whose runtime has `worker_threads` workers
    ///
    /// Zero falls back to the number of CPUs.
    pub fn new(worker_threads: usize) -> Self {
        let default = Self::default();

        let worker_threads = if worker_threads == 0 {
            warn!(
                "Invalid runtime_threads ({}), using default ({})",
                worker_threads, default.worker_threads
            );
            default.worker_threads
        } else {
            worker_threads
        };

        Self { worker_threads }
    }

    /// Worker threads the runtime is built with
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }
}

impl ExecutionStrategy for TokioStrategy {
    fn execute(&self, jobs: Vec<Job>) -> Vec<Result<JobOutcome, BankError>> {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .max_blocking_threads(jobs.len().max(1))
            .thread_name("bank-sim-runtime")
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                return jobs
                    .iter()
                    .map(|job| {
                        Err(BankError::job_failed(
                            &job.name,
                            format!("Failed to create tokio runtime: {}", e),
                        ))
                    })
                    .collect()
            }
        };

        runtime.block_on(async {
            let (names, handles): (Vec<_>, Vec<_>) = jobs
                .into_iter()
                .map(|job| (job.name, tokio::task::spawn_blocking(job.run)))
                .unzip();

            join_all(handles)
                .await
                .into_iter()
                .zip(names)
                .map(|(joined, name)| match joined {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(BankError::job_failed(
                        &name,
                        panic_message(e.into_panic().as_ref()),
                    )),
                    Err(e) => Err(BankError::job_failed(&name, e.to_string())),
                })
                .collect()
        })
    }
}
