//! Account-related types for the transfer simulator
//!
//! This module defines the Account structure and the arithmetic an account
//! can derive from its own operation log.

use super::operation::{Operation, OperationId};
use std::fmt;

/// Account identifier
///
/// Identifiers form the contiguous range `0..n` once loaded into an
/// [`AccountStore`](crate::core::AccountStore).
pub type AccountId = u32;

/// Bank account state
///
/// Balances are whole currency units. An account is only ever mutated while
/// its lock in the store is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Stable identity for the lifetime of the process
    pub id: AccountId,

    /// Opening balance as loaded at startup
    ///
    /// Never changes; auditors recompute the current balance from it.
    pub initial_balance: i64,

    /// Current balance
    pub balance: i64,

    /// Append-only history of transfers touching this account
    pub operations: Vec<Operation>,
}

impl Account {
    /// Create an account with the given opening balance and an empty log
    pub fn new(id: AccountId, initial_balance: i64) -> Self {
        Account {
            id,
            initial_balance,
            balance: initial_balance,
            operations: Vec::new(),
        }
    }

    /// Balance implied by the opening balance and the account's own log
    ///
    /// Operations that do not name this account contribute nothing. Returns
    /// `None` if the sum does not fit in an `i64`.
    pub fn derived_balance(&self) -> Option<i64> {
        self.operations
            .iter()
            .try_fold(self.initial_balance, |acc, op| {
                if op.sender_id == self.id {
                    acc.checked_sub(op.amount)
                } else if op.receiver_id == self.id {
                    acc.checked_add(op.amount)
                } else {
                    Some(acc)
                }
            })
    }

    /// Find an operation in this account's log by id
    pub fn find_operation(&self, id: OperationId) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == id)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BANK ACCOUNT id: {}; balance: {}; operations: {}",
            self.id,
            self.balance,
            self.operations.len()
        )?;
        for op in &self.operations {
            write!(f, "\n    {}", op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: u64, sender_id: AccountId, receiver_id: AccountId, amount: i64) -> Operation {
        Operation {
            id,
            sender_id,
            receiver_id,
            amount,
        }
    }

    #[test]
    fn test_new_account_balance_equals_initial() {
        let account = Account::new(3, 1000);
        assert_eq!(account.balance, 1000);
        assert_eq!(account.initial_balance, 1000);
        assert!(account.operations.is_empty());
        assert_eq!(account.derived_balance(), Some(1000));
    }

    #[test]
    fn test_derived_balance_nets_sent_and_received() {
        let mut account = Account::new(0, 500);
        account.operations.push(op(0, 0, 1, 200));
        account.operations.push(op(1, 2, 0, 50));
        account.operations.push(op(2, 0, 2, 25));

        assert_eq!(account.derived_balance(), Some(325));
    }

    #[test]
    fn test_derived_balance_ignores_foreign_operations() {
        let mut account = Account::new(0, 100);
        account.operations.push(op(7, 4, 5, 90));

        assert_eq!(account.derived_balance(), Some(100));
    }

    #[test]
    fn test_derived_balance_overflow_is_none() {
        let mut account = Account::new(0, i64::MAX);
        account.operations.push(op(0, 1, 0, 1));

        assert_eq!(account.derived_balance(), None);
    }

    #[test]
    fn test_find_operation() {
        let mut account = Account::new(1, 0);
        account.operations.push(op(4, 0, 1, 10));

        assert_eq!(account.find_operation(4), Some(&op(4, 0, 1, 10)));
        assert_eq!(account.find_operation(5), None);
    }

    #[test]
    fn test_display_lists_operations() {
        let mut account = Account::new(1, 300);
        account.balance = 500;
        account.operations.push(op(0, 0, 1, 200));

        let rendered = account.to_string();
        assert!(rendered.starts_with("BANK ACCOUNT id: 1; balance: 500; operations: 1"));
        assert!(rendered.contains("OPERATION {id: 0; senderId: 0; receiverId: 1; amount: 200}"));
    }
}
