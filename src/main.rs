//! Bank Transfer Simulator CLI
//!
//! Command-line interface for running a concurrent transfer simulation over a
//! set of accounts loaded from a text file.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- accounts.txt > accounts.csv
//! cargo run -- --strategy tokio --workers 8 --auditors 2 accounts.txt > accounts.csv
//! cargo run -- --duration-secs 10 --strict-audits --seed 42 accounts.txt > accounts.csv
//! RUST_LOG=bank_transfer_sim=debug cargo run -- --dump accounts.txt
//! ```
//!
//! The program loads the accounts, runs the transfer workers and auditors
//! through the selected execution strategy, audits the final state, and writes
//! the final account states as CSV to stdout. Logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (unreadable or malformed account data, invalid configuration,
//!   failed job, or a consistency violation in the final audit)

use bank_transfer_sim::cli;
use bank_transfer_sim::core::Orchestrator;
use bank_transfer_sim::io;
use bank_transfer_sim::strategy;
use bank_transfer_sim::BankError;
use std::process;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    init_tracing();

    // Parse command-line arguments using clap
    let args = cli::parse_args();

    if let Err(e) = run(&args) {
        error!(error = %e, "simulation failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &cli::CliArgs) -> Result<(), BankError> {
    let store = io::load_accounts(&args.accounts_file)?;
    let orchestrator = Orchestrator::new(store, args.to_config())?;

    let strategy = strategy::create_strategy(args.strategy.clone(), args.runtime_threads());
    let summary = orchestrator.run(strategy.as_ref())?;
    info!(
        seed = summary.seed,
        volume = summary.transfers.volume,
        transient_misses = summary.audits.transient_misses,
        operations = summary.final_audit.operations_checked,
        "final audit passed"
    );

    let accounts = orchestrator.store().snapshot_all();
    if args.dump {
        let mut stderr = std::io::stderr();
        io::write_account_dump(&accounts, &orchestrator.store().ledger(), &mut stderr)?;
    }

    // Output goes to stdout
    let mut output = std::io::stdout();
    io::write_accounts_csv(&accounts, &mut output)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bank_transfer_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
