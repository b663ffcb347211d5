//! Account state output
//!
//! Two renderings of the final account state:
//! - a CSV table (`id,initial_balance,balance,operations`) for stdout
//! - a human-readable dump of every account, its operations, and the ledger

use crate::types::{Account, AccountId, BankError, Operation};
use csv::Writer;
use serde::Serialize;
use std::io::Write;

/// One row of the CSV account report
#[derive(Debug, Serialize)]
struct AccountRow {
    id: AccountId,
    initial_balance: i64,
    balance: i64,
    operations: usize,
}

/// Write account states to CSV format
///
/// Accounts are sorted by id for deterministic output.
///
/// # Errors
///
/// `IoError` if writing or flushing fails.
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), BankError> {
    let mut writer = Writer::from_writer(output);

    let mut sorted: Vec<&Account> = accounts.iter().collect();
    sorted.sort_by_key(|account| account.id);

    for account in sorted {
        writer.serialize(AccountRow {
            id: account.id,
            initial_balance: account.initial_balance,
            balance: account.balance,
            operations: account.operations.len(),
        })?;
    }

    writer.flush()?;
    Ok(())
}

/// Write every account with its operations, followed by the ledger
///
/// # Errors
///
/// `IoError` if writing fails.
pub fn write_account_dump(
    accounts: &[Account],
    ledger: &[Operation],
    output: &mut dyn Write,
) -> Result<(), BankError> {
    for account in accounts {
        writeln!(output, "{}", account)?;
    }
    writeln!(output, "LEDGER ({} operations)", ledger.len())?;
    for operation in ledger {
        writeln!(output, "    {}", operation)?;
    }
    Ok(())
}
