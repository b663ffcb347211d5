use crate::core::{AuditMode, AuditScope, RunLimit, SimulationConfig};
use crate::types::AccountId;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Simulate concurrent transfers between bank accounts while auditing consistency
#[derive(Parser, Debug)]
#[command(name = "bank-sim")]
#[command(about = "Simulate concurrent bank transfers with live consistency audits", long_about = None)]
pub struct CliArgs {
    /// Initial account data: whitespace-separated `id balance` pairs
    #[arg(value_name = "ACCOUNTS", help = "Path to the initial account data file")]
    pub accounts_file: PathBuf,

    /// Execution strategy used to run workers and auditors
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "threads",
        help = "Execution strategy: 'threads' for OS threads or 'tokio' for a tokio runtime"
    )]
    pub strategy: StrategyType,

    /// Number of transfer workers
    #[arg(long = "workers", value_name = "COUNT", default_value_t = 5)]
    pub workers: usize,

    /// Number of consistency auditors
    #[arg(long = "auditors", value_name = "COUNT", default_value_t = 6)]
    pub auditors: usize,

    /// Transfers attempted by each worker
    #[arg(long = "iterations", value_name = "COUNT", default_value_t = 1000)]
    pub iterations: u64,

    /// Audit passes run by each auditor
    #[arg(long = "audit-passes", value_name = "COUNT", default_value_t = 50)]
    pub audit_passes: u64,

    /// Run for a fixed time instead of fixed iteration counts
    #[arg(
        long = "duration-secs",
        value_name = "SECONDS",
        help = "Run every worker and auditor for this many seconds (overrides --iterations and --audit-passes)"
    )]
    pub duration_secs: Option<u64>,

    /// Smallest transfer amount
    #[arg(long = "min-amount", value_name = "AMOUNT", default_value_t = 1)]
    pub min_amount: i64,

    /// Largest transfer amount
    #[arg(long = "max-amount", value_name = "AMOUNT", default_value_t = 100)]
    pub max_amount: i64,

    /// Lowest account id drawn for transfers
    #[arg(long = "min-id", value_name = "ID", default_value_t = 0)]
    pub min_id: AccountId,

    /// Highest account id drawn for transfers
    #[arg(
        long = "max-id",
        value_name = "ID",
        help = "Highest account id drawn for transfers (default: last loaded account)"
    )]
    pub max_id: Option<AccountId>,

    /// Base seed for every worker's and auditor's random generator
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    /// Audit a random sample of accounts per pass instead of all of them
    #[arg(long = "audit-sample", value_name = "COUNT")]
    pub audit_sample: Option<usize>,

    /// Auditors lock every account for each pass
    #[arg(long = "strict-audits")]
    pub strict_audits: bool,

    /// Re-reads granted to a counterparty miss before it is reported
    #[arg(long = "symmetry-retries", value_name = "COUNT", default_value_t = 3)]
    pub symmetry_retries: u32,

    /// Worker threads of the tokio runtime (tokio strategy only)
    #[arg(
        long = "runtime-threads",
        value_name = "COUNT",
        help = "Worker threads of the tokio runtime (default: CPU cores)"
    )]
    pub runtime_threads: Option<usize>,

    /// Print every account with its operations, and the ledger, to stderr
    #[arg(long = "dump")]
    pub dump: bool,
}

/// Available execution strategies
#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Threads,
    Tokio,
}

impl CliArgs {
    /// Create a SimulationConfig from CLI arguments
    pub fn to_config(&self) -> SimulationConfig {
        let limit = match self.duration_secs {
            Some(seconds) => RunLimit::Duration(Duration::from_secs(seconds)),
            None => RunLimit::Iterations {
                transfers: self.iterations,
                audits: self.audit_passes,
            },
        };

        SimulationConfig {
            workers: self.workers,
            auditors: self.auditors,
            limit,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            min_id: self.min_id,
            max_id: self.max_id,
            seed: self.seed,
            audit_scope: self
                .audit_sample
                .map_or(AuditScope::All, AuditScope::Sample),
            audit_mode: if self.strict_audits {
                AuditMode::Strict
            } else {
                AuditMode::Online
            },
            symmetry_retries: self.symmetry_retries,
        }
    }

    /// Worker threads for the tokio runtime; zero means "use the default"
    pub fn runtime_threads(&self) -> usize {
        self.runtime_threads.unwrap_or(0)
    }
}
