//! I/O module
//!
//! Handles initial account loading and account state output.
//!
//! # Components
//!
//! - `loader` - Whitespace-delimited `id balance` parsing into an `AccountStore`
//! - `report` - CSV account table and human-readable account dump

pub mod loader;
pub mod report;

pub use loader::{load_accounts, parse_accounts};
pub use report::{write_account_dump, write_accounts_csv};
