//! Bank Transfer Simulator Library
//! # Overview
//!
//! This library simulates a bank whose accounts receive concurrent random
//! transfers from worker jobs while auditor jobs check, live, that the bank
//! stays consistent. Workers and auditors run on a pluggable execution
//! strategy (OS threads or a tokio runtime).
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Operation, BankError)
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Simulation logic:
//!   - [`core::account_store`] - Accounts behind per-account locks, ordered pair locking
//!   - [`core::transfer`] - Atomic transfers and transfer workers
//!   - [`core::auditor`] - Online and strict consistency audits
//!   - [`core::orchestrator`] - Job construction, run limits, final audit
//! - [`strategy`] - Where the jobs' threads come from
//! - [`io`] - Account data loading and account state output
//!
//! # Invariants
//!
//! Auditors check, for every account and for the bank as a whole:
//!
//! - **Conservation**: the sum of balances equals the initial total
//! - **Derivability**: each balance equals its initial balance plus the net of its operations
//! - **Symmetry**: every operation appears, identical, in both participants' logs
//! - **Uniqueness**: no operation id appears twice in one log
//! - **Ledger**: the global ledger holds exactly the committed operations

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use core::{
    execute_transfer, AccountStore, AuditReport, Orchestrator, RunSummary, SimulationConfig,
};
pub use io::{load_accounts, write_accounts_csv};
pub use types::{Account, AccountId, BankError, Operation, OperationId};
