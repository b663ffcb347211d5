//! Execution strategy module for simulation jobs
//!
//! This module defines the Strategy pattern for running the orchestrator's
//! jobs. Every strategy runs all jobs concurrently and waits for all of them;
//! they differ only in where the jobs' threads come from:
//!
//! - [`ThreadStrategy`]: one named OS thread per job
//! - [`TokioStrategy`]: the blocking pool of a tokio multi-threaded runtime

use crate::cli::StrategyType;
use crate::core::orchestrator::{Job, JobOutcome};
use crate::types::BankError;
use std::any::Any;

pub mod r#async;
pub mod sync;

pub use self::r#async::TokioStrategy;
pub use sync::ThreadStrategy;

/// Execution strategy trait for simulation jobs
///
/// Implementations must run every job concurrently: a job may block on an
/// account lock held by another job, and must not starve it of a thread.
pub trait ExecutionStrategy: Send + Sync {
    /// Run all jobs to completion
    ///
    /// Returns one result per job, in the order the jobs were given. A job
    /// that panics or cannot be started yields a `JobFailed` error in its
    /// slot; the other jobs still run to completion.
    fn execute(&self, jobs: Vec<Job>) -> Vec<Result<JobOutcome, BankError>>;
}

/// Create an execution strategy based on the specified strategy type
///
/// `runtime_threads` sizes the tokio runtime's worker pool and is ignored by
/// the thread strategy.
pub fn create_strategy(
    strategy_type: StrategyType,
    runtime_threads: usize,
) -> Box<dyn ExecutionStrategy> {
    match strategy_type {
        StrategyType::Threads => Box::new(ThreadStrategy),
        StrategyType::Tokio => Box::new(TokioStrategy::new(runtime_threads)),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transfer::TransferStats;
    use rstest::rstest;

    fn job(name: &str, result: Result<JobOutcome, BankError>) -> Job {
        Job {
            name: name.to_string(),
            run: Box::new(move || result),
        }
    }

    #[rstest]
    fn test_results_follow_job_order(#[values(StrategyType::Threads, StrategyType::Tokio)] strategy_type: StrategyType) {
        let strategy = create_strategy(strategy_type, 2);
        let stats = TransferStats {
            attempted: 1,
            ..TransferStats::default()
        };

        let results = strategy.execute(vec![
            job("a", Ok(JobOutcome::Transfers(stats))),
            job("b", Err(BankError::unknown_account(4))),
        ]);

        assert_eq!(
            results,
            vec![
                Ok(JobOutcome::Transfers(stats)),
                Err(BankError::unknown_account(4))
            ]
        );
    }

    #[rstest]
    fn test_panicking_job_is_reported(#[values(StrategyType::Threads, StrategyType::Tokio)] strategy_type: StrategyType) {
        let strategy = create_strategy(strategy_type, 1);

        let results = strategy.execute(vec![Job {
            name: "worker-0".to_string(),
            run: Box::new(|| panic!("boom")),
        }]);

        assert_eq!(results.len(), 1);
        assert!(matches!(
            &results[0],
            Err(BankError::JobFailed { job, .. }) if job == "worker-0"
        ));
    }

    #[rstest]
    fn test_empty_job_list(#[values(StrategyType::Threads, StrategyType::Tokio)] strategy_type: StrategyType) {
        let strategy = create_strategy(strategy_type, 1);
        assert!(strategy.execute(Vec::new()).is_empty());
    }

    #[test]
    fn test_panic_message_variants() {
        let text: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(5u8);

        assert_eq!(panic_message(text.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "job panicked");
    }
}
