//! Simulation lifecycle management
//!
//! The `Orchestrator` turns a [`SimulationConfig`] into one job per transfer
//! worker and per auditor, hands them to an
//! [`ExecutionStrategy`](crate::strategy::ExecutionStrategy), and once every
//! job has finished runs a strict audit of the quiescent store.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     ├── Arc<AccountStore>        (shared by every job)
//!     ├── StopSignal               (checked between iterations)
//!     ├── TransferWorker × workers
//!     └── ConsistencyAuditor × auditors
//! ```

use crate::core::auditor::{audit_strict, AuditMode, AuditReport, AuditScope, AuditStats};
use crate::core::traits::Actor;
use crate::core::transfer::{TransferStats, TransferWorker};
use crate::core::{AccountStore, ConsistencyAuditor};
use crate::strategy::ExecutionStrategy;
use crate::types::{AccountId, BankError};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How long workers and auditors keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Fixed iteration counts per job
    Iterations {
        /// Transfers attempted by each worker
        transfers: u64,
        /// Passes run by each auditor
        audits: u64,
    },
    /// Every job runs until this much time has passed
    Duration(Duration),
}

/// Shared flag asking every job to stop after its current iteration
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create a signal that has not been raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every job to stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-job iteration budget
#[derive(Debug, Clone, Copy)]
pub enum Budget {
    /// Run this many iterations
    Iterations(u64),
    /// Run until this instant
    Until(Instant),
}

/// Drive an actor until its budget runs out or `stop` is raised
///
/// The stop signal and deadline are checked only between iterations, never
/// during one. Returns the number of completed iterations.
///
/// # Errors
///
/// The first error returned by an iteration; the loop ends there.
pub fn drive(actor: &mut dyn Actor, budget: Budget, stop: &StopSignal) -> Result<u64, BankError> {
    let mut completed = 0;
    loop {
        if stop.is_stopped() {
            break;
        }
        match budget {
            Budget::Iterations(limit) if completed >= limit => break,
            Budget::Until(deadline) if Instant::now() >= deadline => break,
            _ => {}
        }
        actor.iteration()?;
        completed += 1;
    }
    Ok(completed)
}

/// Configuration of a simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Number of transfer workers
    pub workers: usize,
    /// Number of consistency auditors
    pub auditors: usize,
    /// How long jobs run
    pub limit: RunLimit,
    /// Smallest transfer amount drawn
    pub min_amount: i64,
    /// Largest transfer amount drawn
    pub max_amount: i64,
    /// Lowest account id workers draw
    pub min_id: AccountId,
    /// Highest account id workers draw; the last account when `None`
    pub max_id: Option<AccountId>,
    /// Base seed for every job's generator; random when `None`
    pub seed: Option<u64>,
    /// Accounts each online audit pass visits
    pub audit_scope: AuditScope,
    /// Lock discipline of the auditors' passes
    pub audit_mode: AuditMode,
    /// Re-reads granted to a counterparty miss before it is reported
    pub symmetry_retries: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            auditors: 6,
            limit: RunLimit::Iterations {
                transfers: 1000,
                audits: 50,
            },
            min_amount: 1,
            max_amount: 100,
            min_id: 0,
            max_id: None,
            seed: None,
            audit_scope: AuditScope::All,
            audit_mode: AuditMode::Online,
            symmetry_retries: 3,
        }
    }
}

impl SimulationConfig {
    /// Check that the configuration can run against `accounts` accounts
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a non-positive or inverted amount range, or for
    /// transfer workers with fewer than two accounts to choose from.
    pub fn validate(&self, accounts: usize) -> Result<(), BankError> {
        if self.min_amount <= 0 {
            return Err(BankError::invalid_config(format!(
                "minimum amount must be positive, got {}",
                self.min_amount
            )));
        }
        if self.min_amount > self.max_amount {
            return Err(BankError::invalid_config(format!(
                "minimum amount {} exceeds maximum amount {}",
                self.min_amount, self.max_amount
            )));
        }
        if self.workers > 0 && accounts < 2 {
            return Err(BankError::invalid_config(format!(
                "transfer workers need at least two accounts, {} loaded",
                accounts
            )));
        }
        if self.workers > 0 {
            let ids = self.id_range(accounts);
            if ids.start() >= ids.end() || *ids.end() as usize >= accounts {
                return Err(BankError::invalid_config(format!(
                    "account id range {}..={} must hold at least two of the {} loaded ids",
                    ids.start(),
                    ids.end(),
                    accounts
                )));
            }
        }
        if self.workers == 0 && self.auditors == 0 {
            warn!("no workers or auditors configured; only the final audit will run");
        }
        Ok(())
    }

    /// Ids workers draw from, given `accounts` loaded accounts
    pub fn id_range(&self, accounts: usize) -> RangeInclusive<AccountId> {
        let last = accounts.saturating_sub(1) as AccountId;
        self.min_id..=self.max_id.unwrap_or(last)
    }

    fn budgets(&self, started: Instant) -> (Budget, Budget) {
        match self.limit {
            RunLimit::Iterations { transfers, audits } => {
                (Budget::Iterations(transfers), Budget::Iterations(audits))
            }
            RunLimit::Duration(duration) => {
                let deadline = started + duration;
                (Budget::Until(deadline), Budget::Until(deadline))
            }
        }
    }
}

/// What a finished job reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Counters of a transfer worker
    Transfers(TransferStats),
    /// Counters of an auditor
    Audits(AuditStats),
}

/// Boxed job body run by an execution strategy
pub type JobFn = Box<dyn FnOnce() -> Result<JobOutcome, BankError> + Send + 'static>;

/// A named unit of work for an execution strategy
pub struct Job {
    /// Name used for threads and failures
    pub name: String,
    /// Body to run to completion
    pub run: JobFn,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

/// Totals of a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Base seed the run used
    pub seed: u64,
    /// Counters summed over all workers
    pub transfers: TransferStats,
    /// Counters summed over all auditors
    pub audits: AuditStats,
    /// Strict audit taken after every job finished
    pub final_audit: AuditReport,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

/// Starts workers and auditors and collects their results
///
/// An orchestrator runs once: its stop signal is never cleared, so a second
/// [`Orchestrator::run`] is rejected.
#[derive(Debug)]
pub struct Orchestrator {
    store: Arc<AccountStore>,
    config: SimulationConfig,
    stop: StopSignal,
    started: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator over `store`
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if [`SimulationConfig::validate`] rejects the
    /// configuration for this store.
    pub fn new(store: AccountStore, config: SimulationConfig) -> Result<Self, BankError> {
        config.validate(store.len())?;
        Ok(Self {
            store: Arc::new(store),
            config,
            stop: StopSignal::new(),
            started: AtomicBool::new(false),
        })
    }

    /// The shared account store
    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    /// Handle that stops every job after its current iteration
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Build every job for one run
    fn jobs(&self, seed: u64, started: Instant) -> Result<Vec<Job>, BankError> {
        let (transfer_budget, audit_budget) = self.config.budgets(started);
        let amounts = self.config.min_amount..=self.config.max_amount;
        let ids = self.config.id_range(self.store.len());
        let mut jobs = Vec::with_capacity(self.config.workers + self.config.auditors);

        for index in 0..self.config.workers {
            let mut worker = TransferWorker::new(
                index,
                Arc::clone(&self.store),
                seed.wrapping_add(index as u64),
                amounts.clone(),
            )?
            .with_id_range(ids.clone())?;
            let stop = self.stop.clone();
            jobs.push(Job {
                name: worker.name().to_string(),
                run: Box::new(move || {
                    guarded(&stop, drive(&mut worker, transfer_budget, &stop))?;
                    Ok(JobOutcome::Transfers(worker.stats()))
                }),
            });
        }

        for index in 0..self.config.auditors {
            let mut auditor = ConsistencyAuditor::new(
                index,
                Arc::clone(&self.store),
                self.config.audit_scope.clone(),
                self.config.audit_mode,
                self.config.symmetry_retries,
                seed.wrapping_add((self.config.workers + index) as u64),
            )?;
            let stop = self.stop.clone();
            jobs.push(Job {
                name: auditor.name().to_string(),
                run: Box::new(move || {
                    guarded(&stop, drive(&mut auditor, audit_budget, &stop))?;
                    Ok(JobOutcome::Audits(auditor.stats()))
                }),
            });
        }

        Ok(jobs)
    }

    /// Run every worker and auditor to completion, then audit the store
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if this orchestrator has already run. Otherwise the
    /// first fatal job error (after every other job has stopped), a job
    /// failure reported by the strategy, or `ConsistencyViolation` if the
    /// final strict audit finds any violation.
    pub fn run(&self, strategy: &dyn ExecutionStrategy) -> Result<RunSummary, BankError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(BankError::invalid_config("orchestrator has already run"));
        }
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let started = Instant::now();
        info!(
            seed,
            accounts = self.store.len(),
            workers = self.config.workers,
            auditors = self.config.auditors,
            "starting simulation"
        );

        let jobs = self.jobs(seed, started)?;
        let outcomes = strategy.execute(jobs);

        let mut transfers = TransferStats::default();
        let mut audits = AuditStats::default();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(JobOutcome::Transfers(stats)) => transfers.merge(&stats),
                Ok(JobOutcome::Audits(stats)) => audits.merge(&stats),
                Err(e) => {
                    self.stop.stop();
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let final_audit = audit_strict(&self.store);
        final_audit.log_verdicts("final");
        let final_audit = final_audit.into_result()?;
        let elapsed = started.elapsed();

        info!(
            attempted = transfers.attempted,
            committed = transfers.committed,
            skipped = transfers.skipped,
            audit_passes = audits.passes,
            failed_audit_passes = audits.failed_passes,
            elapsed_ms = elapsed.as_millis() as u64,
            "simulation finished"
        );

        Ok(RunSummary {
            seed,
            transfers,
            audits,
            final_audit,
            elapsed,
        })
    }
}

/// Raise `stop` when a job hits a fatal error so the other jobs wind down
fn guarded<T>(stop: &StopSignal, result: Result<T, BankError>) -> Result<T, BankError> {
    if result.is_err() {
        stop.stop();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{ThreadStrategy, TokioStrategy};
    use crate::types::{Account, AccountId};
    use rstest::rstest;

    fn store_with(balances: &[i64]) -> AccountStore {
        let accounts = balances
            .iter()
            .enumerate()
            .map(|(id, &balance)| Account::new(id as AccountId, balance))
            .collect();
        AccountStore::new(accounts).unwrap()
    }

    fn strategy(name: &str) -> Box<dyn ExecutionStrategy> {
        match name {
            "threads" => Box::new(ThreadStrategy),
            "tokio" => Box::new(TokioStrategy::new(2)),
            _ => panic!("Unknown strategy: {}", name),
        }
    }

    struct Counter {
        count: u64,
        fail_at: Option<u64>,
    }

    impl Actor for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn iteration(&mut self) -> Result<(), BankError> {
            if Some(self.count) == self.fail_at {
                return Err(BankError::unknown_account(99));
            }
            self.count += 1;
            Ok(())
        }
    }

    #[test]
    fn test_drive_runs_iteration_budget() {
        let mut counter = Counter {
            count: 0,
            fail_at: None,
        };
        let completed = drive(&mut counter, Budget::Iterations(7), &StopSignal::new()).unwrap();
        assert_eq!(completed, 7);
        assert_eq!(counter.count, 7);
    }

    #[test]
    fn test_drive_honours_stop_signal() {
        let stop = StopSignal::new();
        stop.stop();
        let mut counter = Counter {
            count: 0,
            fail_at: None,
        };
        assert_eq!(drive(&mut counter, Budget::Iterations(7), &stop).unwrap(), 0);
    }

    #[test]
    fn test_drive_stops_at_deadline() {
        let mut counter = Counter {
            count: 0,
            fail_at: None,
        };
        let deadline = Instant::now() + Duration::from_millis(20);
        drive(&mut counter, Budget::Until(deadline), &StopSignal::new()).unwrap();
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn test_drive_propagates_error() {
        let mut counter = Counter {
            count: 0,
            fail_at: Some(3),
        };
        let result = drive(&mut counter, Budget::Iterations(10), &StopSignal::new());
        assert_eq!(result.unwrap_err(), BankError::UnknownAccount { account: 99 });
        assert_eq!(counter.count, 3);
    }

    #[rstest]
    #[case::zero_min(SimulationConfig { min_amount: 0, ..SimulationConfig::default() }, 3)]
    #[case::inverted(SimulationConfig { min_amount: 10, max_amount: 5, ..SimulationConfig::default() }, 3)]
    #[case::single_account(SimulationConfig::default(), 1)]
    #[case::single_id(SimulationConfig { min_id: 2, max_id: Some(2), ..SimulationConfig::default() }, 5)]
    #[case::id_past_last(SimulationConfig { max_id: Some(5), ..SimulationConfig::default() }, 5)]
    #[case::min_id_past_last(SimulationConfig { min_id: 4, ..SimulationConfig::default() }, 5)]
    fn test_validate_rejects(#[case] config: SimulationConfig, #[case] accounts: usize) {
        assert!(matches!(
            config.validate(accounts).unwrap_err(),
            BankError::InvalidConfig { .. }
        ));
    }

    #[test]
    fn test_validate_allows_auditors_only_on_single_account() {
        let config = SimulationConfig {
            workers: 0,
            ..SimulationConfig::default()
        };
        assert!(config.validate(1).is_ok());
    }

    #[test]
    fn test_id_range_defaults_to_every_account() {
        let config = SimulationConfig::default();
        assert_eq!(config.id_range(4), 0..=3);

        let config = SimulationConfig {
            min_id: 1,
            max_id: Some(2),
            ..SimulationConfig::default()
        };
        assert_eq!(config.id_range(4), 1..=2);
        assert!(config.validate(4).is_ok());
    }

    #[test]
    fn test_run_draws_only_from_id_range() {
        let store = store_with(&[100, 100, 100, 100, 100]);
        let config = SimulationConfig {
            workers: 3,
            auditors: 1,
            limit: RunLimit::Iterations {
                transfers: 100,
                audits: 5,
            },
            min_id: 1,
            max_id: Some(3),
            seed: Some(8),
            ..SimulationConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config).unwrap();

        orchestrator.run(&ThreadStrategy).unwrap();

        let accounts = orchestrator.store().snapshot_all();
        assert!(accounts[0].operations.is_empty());
        assert!(accounts[4].operations.is_empty());
        assert_eq!(accounts[1..=3].iter().map(|a| a.balance).sum::<i64>(), 300);
    }

    #[rstest]
    fn test_run_conserves_balances(#[values("threads", "tokio")] strategy_name: &str) {
        let store = store_with(&[1000, 1000, 1000, 1000, 1000, 1000]);
        let config = SimulationConfig {
            workers: 5,
            auditors: 3,
            limit: RunLimit::Iterations {
                transfers: 400,
                audits: 20,
            },
            seed: Some(17),
            ..SimulationConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config).unwrap();

        let summary = orchestrator.run(strategy(strategy_name).as_ref()).unwrap();

        assert_eq!(summary.seed, 17);
        assert_eq!(summary.transfers.attempted, 2000);
        assert_eq!(
            summary.transfers.committed + summary.transfers.skipped,
            2000
        );
        assert_eq!(summary.audits.passes, 60);
        assert_eq!(summary.audits.failed_passes, 0);
        assert!(summary.final_audit.is_consistent());

        let accounts = orchestrator.store().snapshot_all();
        let total: i64 = accounts.iter().map(|a| a.balance).sum();
        assert_eq!(total, 6000);
        assert_eq!(
            orchestrator.store().ledger().len() as u64,
            summary.transfers.committed
        );
    }

    #[rstest]
    fn test_high_contention_terminates(
        #[values("threads", "tokio")] strategy_name: &str,
        #[values(AuditMode::Online, AuditMode::Strict)] audit_mode: AuditMode,
    ) {
        // Two accounts: every transfer contends for the same pair of locks
        let store = store_with(&[50, 50]);
        let config = SimulationConfig {
            workers: 8,
            auditors: 4,
            limit: RunLimit::Iterations {
                transfers: 300,
                audits: 30,
            },
            min_amount: 1,
            max_amount: 60,
            seed: Some(3),
            audit_mode,
            ..SimulationConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config).unwrap();

        let summary = orchestrator.run(strategy(strategy_name).as_ref()).unwrap();

        assert_eq!(summary.transfers.attempted, 2400);
        assert!(summary.transfers.skipped > 0);
        assert_eq!(summary.audits.findings, 0);
    }

    #[test]
    fn test_duration_limit_terminates() {
        let store = store_with(&[100, 100, 100]);
        let config = SimulationConfig {
            workers: 2,
            auditors: 1,
            limit: RunLimit::Duration(Duration::from_millis(50)),
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config).unwrap();

        let summary = orchestrator.run(&ThreadStrategy).unwrap();

        assert!(summary.elapsed >= Duration::from_millis(50));
        assert!(summary.final_audit.is_consistent());
    }

    #[test]
    fn test_external_stop_ends_run() {
        let store = store_with(&[100, 100]);
        let config = SimulationConfig {
            workers: 2,
            auditors: 1,
            limit: RunLimit::Duration(Duration::from_secs(3600)),
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config).unwrap();
        let stop = orchestrator.stop_signal();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            stop.stop();
        });
        let summary = orchestrator.run(&ThreadStrategy).unwrap();
        stopper.join().unwrap();

        assert!(summary.elapsed < Duration::from_secs(3600));
        assert!(summary.final_audit.is_consistent());
    }

    #[test]
    fn test_second_run_is_rejected() {
        let store = store_with(&[100, 100]);
        let config = SimulationConfig {
            workers: 1,
            auditors: 1,
            limit: RunLimit::Iterations {
                transfers: 10,
                audits: 2,
            },
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config).unwrap();
        orchestrator.stop_signal().stop();

        let first = orchestrator.run(&ThreadStrategy).unwrap();
        assert_eq!(first.transfers.attempted, 0);

        assert!(matches!(
            orchestrator.run(&ThreadStrategy).unwrap_err(),
            BankError::InvalidConfig { .. }
        ));
    }

    #[test]
    fn test_unknown_audit_id_fails_before_start() {
        let store = store_with(&[100, 100]);
        let config = SimulationConfig {
            audit_scope: AuditScope::Ids(vec![0, 4]),
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config).unwrap();

        let result = orchestrator.run(&ThreadStrategy);
        assert_eq!(result.unwrap_err(), BankError::UnknownAccount { account: 4 });
        assert!(orchestrator.store().ledger().is_empty());
    }

    #[test]
    fn test_final_audit_violation_is_fatal() {
        let store = store_with(&[100, 100]);
        store.lock(0).unwrap().credit(1).unwrap();
        let config = SimulationConfig {
            workers: 0,
            auditors: 0,
            ..SimulationConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config).unwrap();

        let result = orchestrator.run(&ThreadStrategy);
        assert!(matches!(
            result.unwrap_err(),
            BankError::ConsistencyViolation { .. }
        ));
    }
}
