//! Account storage with per-account locking
//!
//! This module provides the `AccountStore` struct, the authoritative holder of
//! every account and of the one exclusive lock guarding each of them.
//!
//! # Design
//!
//! Accounts live in a single `Vec<Mutex<Account>>` indexed by account id. The
//! id space is validated at construction to be exactly `0..n`, so an id always
//! maps to its own lock and no separate lock table has to be kept in step.
//!
//! The store exposes primitives only: lock an account, read it, debit, credit,
//! append to its log, and hand out operation ids. Composite transfer semantics
//! live in [`crate::core::transfer`].
//!
//! # Lock Ordering
//!
//! Code that needs more than one account at a time goes through
//! [`AccountStore::lock_pair`] or [`AccountStore::lock_all`], both of which
//! acquire in ascending id order. Any two threads therefore request shared
//! locks in the same global order and cannot deadlock.
//!
//! The diagnostic ledger has its own mutex. It is only taken after all needed
//! account locks are held and is released before any other account lock is
//! requested.

use crate::types::{Account, AccountId, BankError, Operation, OperationId};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed collection of accounts, each behind its own lock
#[derive(Debug)]
pub struct AccountStore {
    /// Account state indexed by id
    accounts: Vec<Mutex<Account>>,

    /// Sum of opening balances, fixed at construction
    initial_total: i64,

    /// Next operation id to hand out
    ///
    /// Independent of every account lock so it can be consumed while two
    /// account locks are already held.
    next_operation_id: AtomicU64,

    /// Every committed operation in commit order (diagnostics only)
    ledger: Mutex<Vec<Operation>>,
}

impl AccountStore {
    /// Build a store from freshly loaded accounts
    ///
    /// The accounts may arrive in any order but their ids must be exactly
    /// `0..n` with no gaps or duplicates. Each account must be unused: its
    /// balance equal to its opening balance, which must not be negative, and
    /// its log empty.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAccountSet` if the set is empty or the ids or
    /// balances fail validation, and `ArithmeticOverflow` if the opening
    /// balances do not sum within `i64`.
    pub fn new(accounts: Vec<Account>) -> Result<Self, BankError> {
        if accounts.is_empty() {
            return Err(BankError::invalid_account_set("no accounts loaded"));
        }

        let count = accounts.len();
        let mut slots: Vec<Option<Account>> = vec![None; count];
        let mut initial_total: i64 = 0;

        for account in accounts {
            let index = account.id as usize;
            if index >= count {
                return Err(BankError::invalid_account_set(format!(
                    "account id {} outside contiguous range 0..{}",
                    account.id, count
                )));
            }
            if account.initial_balance < 0 {
                return Err(BankError::invalid_account_set(format!(
                    "account {} has negative opening balance {}",
                    account.id, account.initial_balance
                )));
            }
            if account.balance != account.initial_balance || !account.operations.is_empty() {
                return Err(BankError::invalid_account_set(format!(
                    "account {} already carries history",
                    account.id
                )));
            }
            if slots[index].is_some() {
                return Err(BankError::invalid_account_set(format!(
                    "duplicate account id {}",
                    account.id
                )));
            }

            initial_total = initial_total
                .checked_add(account.initial_balance)
                .ok_or_else(|| BankError::arithmetic_overflow("opening total", account.id))?;
            slots[index] = Some(account);
        }

        // Every slot is filled: `count` distinct ids, all below `count`
        let accounts = slots
            .into_iter()
            .map(|slot| slot.map(Mutex::new))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| BankError::invalid_account_set("account ids are not contiguous"))?;

        Ok(Self {
            accounts,
            initial_total,
            next_operation_id: AtomicU64::new(0),
            ledger: Mutex::new(Vec::new()),
        })
    }

    /// Number of accounts in the store
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store holds no accounts (never true for a constructed store)
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// All account ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = AccountId> {
        (0..self.accounts.len()).map(|index| index as AccountId)
    }

    /// Sum of all opening balances
    pub fn total_initial_balance(&self) -> i64 {
        self.initial_total
    }

    fn slot(&self, id: AccountId) -> Result<&Mutex<Account>, BankError> {
        self.accounts
            .get(id as usize)
            .ok_or_else(|| BankError::unknown_account(id))
    }

    /// Acquire the exclusive lock of one account
    ///
    /// Blocks until the lock is available. The lock is released when the
    /// returned guard is dropped.
    pub fn lock(&self, id: AccountId) -> Result<AccountGuard<'_>, BankError> {
        let slot = self.slot(id)?;
        Ok(AccountGuard { guard: slot.lock() })
    }

    /// Acquire the locks of two distinct accounts in ascending id order
    ///
    /// The acquisition order depends only on the ids, never on which one is
    /// passed first. The returned guard still reports the accounts in argument
    /// order via [`PairGuard::first`] and [`PairGuard::second`].
    ///
    /// # Errors
    ///
    /// `SameAccount` if both ids are equal, `UnknownAccount` if either id is
    /// outside the store. Both are checked before any lock is taken.
    pub fn lock_pair(
        &self,
        first: AccountId,
        second: AccountId,
    ) -> Result<PairGuard<'_>, BankError> {
        if first == second {
            return Err(BankError::SameAccount { account: first });
        }
        let first_slot = self.slot(first)?;
        let second_slot = self.slot(second)?;

        let (first, second) = if first < second {
            let low = first_slot.lock();
            let high = second_slot.lock();
            (low, high)
        } else {
            let low = second_slot.lock();
            let high = first_slot.lock();
            (high, low)
        };

        Ok(PairGuard {
            first: AccountGuard { guard: first },
            second: AccountGuard { guard: second },
        })
    }

    /// Acquire every account lock in ascending id order
    ///
    /// While the returned guards are alive no transfer can be in flight, so
    /// the store is observed in a state that satisfies every invariant.
    pub fn lock_all(&self) -> Vec<AccountGuard<'_>> {
        self.accounts
            .iter()
            .map(|slot| AccountGuard { guard: slot.lock() })
            .collect()
    }

    /// Consistent copy of every account
    pub fn snapshot_all(&self) -> Vec<Account> {
        self.lock_all()
            .iter()
            .map(AccountGuard::snapshot)
            .collect()
    }

    /// Hand out a fresh, process-wide unique operation id
    ///
    /// Safe to call with or without account locks held.
    pub fn next_operation_id(&self) -> OperationId {
        self.next_operation_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of operation ids handed out so far
    pub fn issued_operation_ids(&self) -> u64 {
        self.next_operation_id.load(Ordering::Relaxed)
    }

    /// Append a committed operation to the diagnostic ledger
    pub fn record_in_ledger(&self, operation: Operation) {
        self.ledger.lock().push(operation);
    }

    /// Copy of the diagnostic ledger in commit order
    pub fn ledger(&self) -> Vec<Operation> {
        self.ledger.lock().clone()
    }
}

/// Exclusive access to one account
///
/// Holding the guard is the proof of lock ownership that every mutation
/// requires. Dropping it releases the lock.
#[derive(Debug)]
pub struct AccountGuard<'a> {
    guard: MutexGuard<'a, Account>,
}

impl AccountGuard<'_> {
    /// Id of the locked account
    pub fn id(&self) -> AccountId {
        self.guard.id
    }

    /// Current balance
    pub fn balance(&self) -> i64 {
        self.guard.balance
    }

    /// Read-only view of the locked account
    pub fn get(&self) -> &Account {
        &self.guard
    }

    /// Owned copy of the locked account
    pub fn snapshot(&self) -> Account {
        self.guard.clone()
    }

    /// Remove `amount` from the balance
    ///
    /// # Errors
    ///
    /// `InvalidAmount` for a non-positive amount and `InsufficientFunds` when
    /// the balance is lower than `amount`. The account is untouched on error.
    pub fn debit(&mut self, amount: i64) -> Result<(), BankError> {
        if amount <= 0 {
            return Err(BankError::InvalidAmount { amount });
        }
        let account = &mut *self.guard;
        if account.balance < amount {
            return Err(BankError::insufficient_funds(
                account.id,
                account.balance,
                amount,
            ));
        }
        account.balance = account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| BankError::arithmetic_overflow("debit", account.id))?;
        Ok(())
    }

    /// Add `amount` to the balance
    ///
    /// # Errors
    ///
    /// `InvalidAmount` for a non-positive amount and `ArithmeticOverflow` if
    /// the new balance does not fit. The account is untouched on error.
    pub fn credit(&mut self, amount: i64) -> Result<(), BankError> {
        if amount <= 0 {
            return Err(BankError::InvalidAmount { amount });
        }
        let account = &mut *self.guard;
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| BankError::arithmetic_overflow("credit", account.id))?;
        Ok(())
    }

    /// Append an operation to this account's log
    pub fn append_operation(&mut self, operation: Operation) {
        self.guard.operations.push(operation);
    }
}

/// Exclusive access to two distinct accounts, acquired in ascending id order
#[derive(Debug)]
pub struct PairGuard<'a> {
    first: AccountGuard<'a>,
    second: AccountGuard<'a>,
}

impl<'a> PairGuard<'a> {
    /// Guard for the first id passed to `lock_pair`
    pub fn first(&self) -> &AccountGuard<'a> {
        &self.first
    }

    /// Guard for the second id passed to `lock_pair`
    pub fn second(&self) -> &AccountGuard<'a> {
        &self.second
    }

    /// Mutable access to both guards, in argument order
    pub fn both_mut(&mut self) -> (&mut AccountGuard<'a>, &mut AccountGuard<'a>) {
        (&mut self.first, &mut self.second)
    }
}
