//! Initial account data loading
//!
//! The input is a plain text stream of whitespace-separated integer pairs,
//! `id balance`, one account per pair. There is no header and no count; the
//! end of the stream ends the list. Pairs may share a line or span lines.
//!
//! # Error Handling
//!
//! Loading is all-or-nothing: a malformed token, an id without a balance, or
//! an id set that is not exactly `0..n` aborts the load, with the line number
//! in the error where one applies.

use crate::core::AccountStore;
use crate::types::{Account, AccountId, BankError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Parse `id balance` pairs from a reader
///
/// Validation of the id set is left to [`AccountStore::new`].
///
/// # Errors
///
/// `ParseError` for a token that is not an integer of the right range or for
/// a trailing id without a balance, `IoError` if reading fails.
pub fn parse_accounts<R: BufRead>(reader: R) -> Result<Vec<Account>, BankError> {
    let mut accounts = Vec::new();
    let mut pending: Option<(AccountId, usize)> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_num = index + 1;

        for token in line.split_whitespace() {
            match pending.take() {
                None => {
                    let id = token.parse::<AccountId>().map_err(|_| {
                        BankError::parse_error(
                            Some(line_num),
                            format!("invalid account id '{}'", token),
                        )
                    })?;
                    pending = Some((id, line_num));
                }
                Some((id, _)) => {
                    let balance = token.parse::<i64>().map_err(|_| {
                        BankError::parse_error(
                            Some(line_num),
                            format!("invalid balance '{}' for account {}", token, id),
                        )
                    })?;
                    accounts.push(Account::new(id, balance));
                }
            }
        }
    }

    if let Some((id, line_num)) = pending {
        return Err(BankError::parse_error(
            Some(line_num),
            format!("account {} has no balance", id),
        ));
    }

    Ok(accounts)
}

/// Load accounts from a file and build the store
///
/// # Errors
///
/// `IoError` if the file cannot be opened or read, `ParseError` for
/// malformed data, `InvalidAccountSet` if the ids are not exactly `0..n`.
pub fn load_accounts(path: &Path) -> Result<AccountStore, BankError> {
    let file = File::open(path).map_err(|e| BankError::IoError {
        message: format!("Failed to open file '{}': {}", path.display(), e),
    })?;

    let accounts = parse_accounts(BufReader::new(file))?;
    let store = AccountStore::new(accounts)?;
    info!(
        path = %path.display(),
        accounts = store.len(),
        total = store.total_initial_balance(),
        "loaded accounts"
    );
    Ok(store)
}
