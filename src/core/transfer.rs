//! Transfer execution and randomized transfer workers
//!
//! [`execute_transfer`] composes the store's primitives into one atomic
//! transfer: both accounts are locked through `lock_pair`, so between the
//! balance check and the final log append no other thread can observe or
//! modify either account.
//!
//! [`TransferWorker`] draws random transfers and feeds them to
//! `execute_transfer`. Each worker owns its random generator, seeded once when
//! the worker is created.

use crate::core::traits::Actor;
use crate::core::AccountStore;
use crate::types::{AccountId, BankError, Operation};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::debug;

/// Move `amount` from `sender` to `receiver` as one atomic step
///
/// On success the same [`Operation`] has been appended to the sender's log,
/// then to the receiver's log, and recorded in the ledger. On any error no
/// balance, log, or ledger has changed.
///
/// # Errors
///
/// - `InvalidAmount` if `amount` is not positive
/// - `SameAccount` / `UnknownAccount` from the pair lock
/// - `InsufficientFunds` if the sender's balance is below `amount`
/// - `ArithmeticOverflow` if the receiver cannot be credited
pub fn execute_transfer(
    store: &AccountStore,
    sender: AccountId,
    receiver: AccountId,
    amount: i64,
) -> Result<Operation, BankError> {
    if amount <= 0 {
        return Err(BankError::InvalidAmount { amount });
    }

    let mut pair = store.lock_pair(sender, receiver)?;
    let (from, to) = pair.both_mut();

    if from.balance() < amount {
        return Err(BankError::insufficient_funds(
            from.id(),
            from.balance(),
            amount,
        ));
    }
    // Checked up front so the debit below is never left without its credit
    if to.balance().checked_add(amount).is_none() {
        return Err(BankError::arithmetic_overflow("credit", to.id()));
    }

    let operation = Operation {
        id: store.next_operation_id(),
        sender_id: sender,
        receiver_id: receiver,
        amount,
    };

    from.debit(amount)?;
    to.credit(amount)?;
    from.append_operation(operation);
    to.append_operation(operation);
    store.record_in_ledger(operation);

    Ok(operation)
}

/// Counters kept by a transfer worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Transfers drawn and attempted
    pub attempted: u64,
    /// Transfers committed
    pub committed: u64,
    /// Transfers rejected for insufficient funds
    pub skipped: u64,
    /// Sum of committed amounts
    pub volume: u64,
}

impl TransferStats {
    /// Add another worker's counters to these
    pub fn merge(&mut self, other: &TransferStats) {
        self.attempted += other.attempted;
        self.committed += other.committed;
        self.skipped += other.skipped;
        self.volume = self.volume.saturating_add(other.volume);
    }
}

/// Issues one random transfer per iteration
#[derive(Debug)]
pub struct TransferWorker {
    name: String,
    store: Arc<AccountStore>,
    rng: ChaCha8Rng,
    ids: RangeInclusive<AccountId>,
    amounts: RangeInclusive<i64>,
    stats: TransferStats,
}

impl TransferWorker {
    /// Create a worker with its own generator seeded from `seed`
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the store has fewer than two accounts or the amount
    /// range is empty or not strictly positive.
    pub fn new(
        index: usize,
        store: Arc<AccountStore>,
        seed: u64,
        amounts: RangeInclusive<i64>,
    ) -> Result<Self, BankError> {
        if store.len() < 2 {
            return Err(BankError::invalid_config(format!(
                "transfers need at least two accounts, store has {}",
                store.len()
            )));
        }
        if amounts.is_empty() || *amounts.start() <= 0 {
            return Err(BankError::invalid_config(format!(
                "transfer amount range {}..={} must be non-empty and positive",
                amounts.start(),
                amounts.end()
            )));
        }

        let last = (store.len() - 1) as AccountId;
        Ok(Self {
            name: format!("worker-{}", index),
            store,
            rng: ChaCha8Rng::seed_from_u64(seed),
            ids: 0..=last,
            amounts,
            stats: TransferStats::default(),
        })
    }

    /// Restrict sender and receiver selection to `ids`
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the range holds fewer than two ids, and
    /// `UnknownAccount` if it reaches past the last account.
    pub fn with_id_range(mut self, ids: RangeInclusive<AccountId>) -> Result<Self, BankError> {
        if ids.is_empty() || ids.start() == ids.end() {
            return Err(BankError::invalid_config(format!(
                "account id range {}..={} must hold at least two ids",
                ids.start(),
                ids.end()
            )));
        }
        if *ids.end() as usize >= self.store.len() {
            return Err(BankError::unknown_account(*ids.end()));
        }
        self.ids = ids;
        Ok(self)
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// Draw two distinct accounts and an amount
    fn draw(&mut self) -> (AccountId, AccountId, i64) {
        let sender = self.rng.gen_range(self.ids.clone());
        let mut receiver = self.rng.gen_range(self.ids.clone());
        while receiver == sender {
            receiver = self.rng.gen_range(self.ids.clone());
        }
        let amount = self.rng.gen_range(self.amounts.clone());
        (sender, receiver, amount)
    }
}

impl Actor for TransferWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn iteration(&mut self) -> Result<(), BankError> {
        let (sender, receiver, amount) = self.draw();
        self.stats.attempted += 1;

        match execute_transfer(&self.store, sender, receiver, amount) {
            Ok(operation) => {
                self.stats.committed += 1;
                self.stats.volume = self.stats.volume.saturating_add(amount as u64);
                debug!(worker = %self.name, %operation, "transfer committed");
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                self.stats.skipped += 1;
                debug!(worker = %self.name, error = %e, "transfer skipped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Account;
    use rstest::rstest;
    use std::thread;

    fn store_with(balances: &[i64]) -> Arc<AccountStore> {
        let accounts = balances
            .iter()
            .enumerate()
            .map(|(id, &balance)| Account::new(id as AccountId, balance))
            .collect();
        Arc::new(AccountStore::new(accounts).unwrap())
    }

    #[test]
    fn test_transfer_then_rejected_transfer() {
        let store = store_with(&[500, 300]);

        let op = execute_transfer(&store, 0, 1, 200).unwrap();
        assert_eq!(
            op,
            Operation {
                id: 0,
                sender_id: 0,
                receiver_id: 1,
                amount: 200
            }
        );

        let a = store.lock(0).unwrap().snapshot();
        let b = store.lock(1).unwrap().snapshot();
        assert_eq!(a.balance, 300);
        assert_eq!(b.balance, 500);
        assert_eq!(a.operations, vec![op]);
        assert_eq!(b.operations, vec![op]);

        let result = execute_transfer(&store, 1, 0, 600);
        assert_eq!(
            result.unwrap_err(),
            BankError::InsufficientFunds {
                account: 1,
                balance: 500,
                requested: 600
            }
        );
        assert_eq!(store.lock(0).unwrap().snapshot(), a);
        assert_eq!(store.lock(1).unwrap().snapshot(), b);
        assert_eq!(store.ledger(), vec![op]);
    }

    #[test]
    fn test_rejected_transfer_consumes_no_operation_id() {
        let store = store_with(&[10, 10]);

        assert!(execute_transfer(&store, 0, 1, 11).is_err());
        assert_eq!(store.issued_operation_ids(), 0);
        assert!(store.ledger().is_empty());
    }

    #[test]
    fn test_transfer_of_entire_balance() {
        let store = store_with(&[50, 0]);

        execute_transfer(&store, 0, 1, 50).unwrap();

        assert_eq!(store.lock(0).unwrap().balance(), 0);
        assert_eq!(store.lock(1).unwrap().balance(), 50);
    }

    #[test]
    fn test_transfer_from_higher_to_lower_id() {
        let store = store_with(&[0, 0, 100]);

        let op = execute_transfer(&store, 2, 0, 40).unwrap();

        assert_eq!(op.sender_id, 2);
        assert_eq!(op.receiver_id, 0);
        assert_eq!(store.lock(2).unwrap().balance(), 60);
        assert_eq!(store.lock(0).unwrap().balance(), 40);
    }

    #[test]
    fn test_transfer_rejects_invalid_requests() {
        let store = store_with(&[10, 10]);

        assert_eq!(
            execute_transfer(&store, 0, 1, 0).unwrap_err(),
            BankError::InvalidAmount { amount: 0 }
        );
        assert_eq!(
            execute_transfer(&store, 1, 1, 5).unwrap_err(),
            BankError::SameAccount { account: 1 }
        );
        assert_eq!(
            execute_transfer(&store, 0, 9, 5).unwrap_err(),
            BankError::UnknownAccount { account: 9 }
        );
        assert!(store.ledger().is_empty());
    }

    #[test]
    fn test_transfer_overflow_is_all_or_nothing() {
        let store = store_with(&[10, 0]);
        store.lock(1).unwrap().credit(i64::MAX - 2).unwrap();

        let result = execute_transfer(&store, 0, 1, 5);

        assert_eq!(
            result.unwrap_err(),
            BankError::ArithmeticOverflow {
                operation: "credit".to_string(),
                account: 1
            }
        );
        let sender = store.lock(0).unwrap().snapshot();
        let receiver = store.lock(1).unwrap().snapshot();
        assert_eq!(sender.balance, 10);
        assert_eq!(receiver.balance, i64::MAX - 2);
        assert!(sender.operations.is_empty());
        assert!(receiver.operations.is_empty());
        assert!(store.ledger().is_empty());
        assert_eq!(store.issued_operation_ids(), 0);
    }

    #[test]
    fn test_worker_stays_inside_id_range() {
        let store = store_with(&[100, 100, 100, 100, 100]);
        let mut worker = TransferWorker::new(0, Arc::clone(&store), 3, 1..=20)
            .unwrap()
            .with_id_range(1..=3)
            .unwrap();

        for _ in 0..200 {
            worker.iteration().unwrap();
        }

        assert!(worker.stats().committed > 0);
        assert!(store
            .ledger()
            .iter()
            .all(|op| (1..=3).contains(&op.sender_id) && (1..=3).contains(&op.receiver_id)));
        assert_eq!(store.lock(0).unwrap().balance(), 100);
        assert_eq!(store.lock(4).unwrap().balance(), 100);
    }

    #[rstest]
    #[case::single_id(2..=2)]
    #[case::past_last_account(3..=5)]
    fn test_worker_rejects_bad_id_range(#[case] ids: RangeInclusive<AccountId>) {
        let worker = TransferWorker::new(0, store_with(&[10, 10, 10, 10]), 1, 1..=5).unwrap();
        assert!(worker.with_id_range(ids).is_err());
    }

    #[test]
    fn test_worker_rejects_single_account_store() {
        let result = TransferWorker::new(0, store_with(&[10]), 1, 1..=10);
        assert!(matches!(result.unwrap_err(), BankError::InvalidConfig { .. }));
    }

    #[test]
    fn test_worker_rejects_bad_amount_range() {
        let store = store_with(&[10, 10]);
        assert!(TransferWorker::new(0, Arc::clone(&store), 1, 0..=10).is_err());
        #[allow(clippy::reversed_empty_ranges)]
        let empty = 10..=1;
        assert!(TransferWorker::new(0, store, 1, empty).is_err());
    }

    #[test]
    fn test_worker_counts_outcomes() {
        let store = store_with(&[100, 100, 100]);
        let mut worker = TransferWorker::new(0, Arc::clone(&store), 7, 1..=100).unwrap();

        for _ in 0..200 {
            worker.iteration().unwrap();
        }

        let stats = worker.stats();
        assert_eq!(stats.attempted, 200);
        assert_eq!(stats.committed + stats.skipped, 200);
        assert_eq!(stats.committed as usize, store.ledger().len());
    }

    #[test]
    fn test_same_seed_gives_same_run() {
        let run = |seed| {
            let store = store_with(&[100, 100, 100, 100]);
            let mut worker = TransferWorker::new(0, Arc::clone(&store), seed, 1..=60).unwrap();
            for _ in 0..100 {
                worker.iteration().unwrap();
            }
            (worker.stats(), store.ledger())
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_concurrent_workers_conserve_total() {
        let store = store_with(&[1000, 1000, 1000, 1000]);

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut worker = TransferWorker::new(index, store, index as u64, 1..=100).unwrap();
                    for _ in 0..500 {
                        worker.iteration().unwrap();
                    }
                    worker.stats()
                })
            })
            .collect();

        let mut total = TransferStats::default();
        for handle in handles {
            total.merge(&handle.join().unwrap());
        }

        let accounts = store.snapshot_all();
        let sum: i64 = accounts.iter().map(|a| a.balance).sum();
        assert_eq!(sum, 4000);
        assert_eq!(total.attempted, 4000);
        assert_eq!(total.committed as usize, store.ledger().len());
        for account in &accounts {
            assert_eq!(account.derived_balance(), Some(account.balance));
        }
    }

    #[test]
    fn test_stats_merge() {
        let mut a = TransferStats {
            attempted: 3,
            committed: 2,
            skipped: 1,
            volume: 50,
        };
        a.merge(&TransferStats {
            attempted: 1,
            committed: 1,
            skipped: 0,
            volume: 5,
        });
        assert_eq!(
            a,
            TransferStats {
                attempted: 4,
                committed: 3,
                skipped: 1,
                volume: 55
            }
        );
    }
}
