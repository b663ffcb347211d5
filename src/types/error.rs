//! Error types for the transfer simulator
//!
//! This module defines all error types that can occur while loading accounts,
//! executing transfers, and auditing account state.
//!
//! # Error Categories
//!
//! - **Load Errors**: I/O failures, malformed initial data, invalid id sets
//! - **Transfer Errors**: Insufficient funds, unknown accounts, invalid amounts
//! - **Audit Errors**: Consistency violations found by an auditor
//! - **Runtime Errors**: Invalid configuration, failed worker jobs

use crate::types::AccountId;
use thiserror::Error;

/// Main error type for the simulator
///
/// Only [`BankError::InsufficientFunds`] is an expected, per-attempt outcome.
/// Every other variant indicates a configuration problem, bad input data, or a
/// concurrency-control bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    /// Sender balance does not cover the transfer amount
    ///
    /// The transfer is skipped and no state changes.
    #[error("Insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Account that would have been debited
        account: AccountId,
        /// Balance at the time of the attempt
        balance: i64,
        /// Requested amount
        requested: i64,
    },

    /// Account id outside the loaded id space
    #[error("Unknown account {account}")]
    UnknownAccount {
        /// The id that was looked up
        account: AccountId,
    },

    /// Sender and receiver are the same account
    #[error("Account {account} cannot transfer to itself")]
    SameAccount {
        /// The repeated id
        account: AccountId,
    },

    /// Transfer amount is zero or negative
    #[error("Invalid transfer amount {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: i64,
    },

    /// Balance arithmetic would leave the i64 range
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account whose balance would overflow
        account: AccountId,
    },

    /// An audit found account state that breaks an invariant
    #[error("Consistency violation: {violations} failed check(s); first: {first}")]
    ConsistencyViolation {
        /// Number of failed checks in the audit
        violations: usize,
        /// Description of the first failure
        first: String,
    },

    /// Initial account data could not be parsed
    #[error("Account data parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Description of the parsing error
        message: String,
    },

    /// Loaded accounts do not form a usable id space
    #[error("Invalid account set: {message}")]
    InvalidAccountSet {
        /// What is wrong with the set
        message: String,
    },

    /// Simulation configuration cannot be run
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration
        message: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// A worker or auditor job panicked or could not be joined
    #[error("Job {job} failed: {message}")]
    JobFailed {
        /// Name of the job
        job: String,
        /// Panic or join failure message
        message: String,
    },
}

// Conversion from io::Error to BankError
impl From<std::io::Error> for BankError {
    fn from(error: std::io::Error) -> Self {
        BankError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to BankError (report output)
impl From<csv::Error> for BankError {
    fn from(error: csv::Error) -> Self {
        BankError::IoError {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl BankError {
    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: AccountId, balance: i64, requested: i64) -> Self {
        BankError::InsufficientFunds {
            account,
            balance,
            requested,
        }
    }

    /// Create an UnknownAccount error
    pub fn unknown_account(account: AccountId) -> Self {
        BankError::UnknownAccount { account }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: AccountId) -> Self {
        BankError::ArithmeticOverflow {
            operation: operation.to_string(),
            account,
        }
    }

    /// Create a ParseError
    pub fn parse_error(line: Option<usize>, message: impl Into<String>) -> Self {
        BankError::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an InvalidAccountSet error
    pub fn invalid_account_set(message: impl Into<String>) -> Self {
        BankError::InvalidAccountSet {
            message: message.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        BankError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a JobFailed error
    pub fn job_failed(job: &str, message: impl Into<String>) -> Self {
        BankError::JobFailed {
            job: job.to_string(),
            message: message.into(),
        }
    }

    /// Whether a worker may log this error and carry on with its next iteration
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BankError::InsufficientFunds { .. })
    }
}
