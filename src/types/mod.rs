//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account state and identifiers
//! - `operation`: Committed transfer records and identifiers
//! - `error`: Error types for the simulator

pub mod account;
pub mod error;
pub mod operation;

pub use account::{Account, AccountId};
pub use error::BankError;
pub use operation::{Operation, OperationId};
