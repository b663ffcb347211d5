//! Core simulation module
//!
//! This module contains the transfer-and-audit components:
//! - `traits` - The `Actor` abstraction driven by the orchestrator
//! - `account_store` - Accounts, per-account locks, operation ids, ledger
//! - `transfer` - Atomic transfers and randomized transfer workers
//! - `auditor` - Online and strict consistency audits
//! - `orchestrator` - Job construction, run limits, final audit

pub mod account_store;
pub mod auditor;
pub mod orchestrator;
pub mod traits;
pub mod transfer;

pub use account_store::{AccountGuard, AccountStore, PairGuard};
pub use auditor::{
    audit_online, audit_strict, AuditMode, AuditReport, AuditScope, AuditStats,
    ConsistencyAuditor, Finding, Invariant,
};
pub use orchestrator::{
    Orchestrator, RunLimit, RunSummary, SimulationConfig, StopSignal,
};
pub use traits::Actor;
pub use transfer::{execute_transfer, TransferStats, TransferWorker};
