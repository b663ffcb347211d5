//! Consistency auditing against live account state
//!
//! Auditors recompute every audited account's balance from its own log and
//! cross-check each logged operation against the counterparty's log, while
//! transfers keep committing concurrently.
//!
//! # Modes
//!
//! - **Online**: each account is locked alone, snapshotted, and released. The
//!   derivability check is exact because it runs on a snapshot taken under
//!   the account's own lock. The symmetry check compares against counterparty
//!   logs read at different instants, so a miss is re-read before it counts.
//! - **Strict**: every account is locked in ascending id order, which waits
//!   out in-flight transfers, and all invariants are checked without any
//!   tolerance: conservation, derivability, symmetry, uniqueness, and
//!   agreement with the ledger.
//!
//! Findings are aggregated over the whole audited set and reported once per
//! invariant.

use crate::core::traits::Actor;
use crate::core::AccountStore;
use crate::types::{Account, AccountId, BankError, Operation, OperationId};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Which accounts an online pass visits
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuditScope {
    /// Every account
    #[default]
    All,
    /// A random subset of this many accounts, drawn afresh each pass
    Sample(usize),
    /// A fixed list of accounts
    Ids(Vec<AccountId>),
}

/// How a pass acquires account locks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditMode {
    /// One account lock at a time
    #[default]
    Online,
    /// All account locks at once
    Strict,
}

/// Invariants an audit can check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invariant {
    /// Total balance equals total opening balance
    Conservation,
    /// Balance equals opening balance plus net logged flow
    Derivability,
    /// Each operation is logged by both parties
    Symmetry,
    /// Operation ids are never reused
    Uniqueness,
    /// The ledger holds exactly the logged operations
    Ledger,
}

impl Invariant {
    /// Invariants checked by a pass in `mode`, in reporting order
    pub fn checked_in(mode: AuditMode) -> &'static [Invariant] {
        match mode {
            AuditMode::Online => &[
                Invariant::Derivability,
                Invariant::Symmetry,
                Invariant::Uniqueness,
            ],
            AuditMode::Strict => &[
                Invariant::Conservation,
                Invariant::Derivability,
                Invariant::Symmetry,
                Invariant::Uniqueness,
                Invariant::Ledger,
            ],
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Invariant::Conservation => "conservation",
            Invariant::Derivability => "derivability",
            Invariant::Symmetry => "symmetry",
            Invariant::Uniqueness => "uniqueness",
            Invariant::Ledger => "ledger",
        };
        f.write_str(name)
    }
}

/// A single failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Total balance differs from the opening total
    TotalMismatch { expected: i64, actual: i64 },
    /// Balance differs from the one derived from the log
    BalanceMismatch {
        account: AccountId,
        balance: i64,
        derived: Option<i64>,
    },
    /// Logged operation does not name the account holding it
    ForeignOperation {
        account: AccountId,
        operation: OperationId,
    },
    /// Operation id appears twice in one log, or with different contents
    DuplicateOperation {
        account: AccountId,
        operation: OperationId,
    },
    /// Counterparty log lacks the operation
    MissingCounterpart {
        account: AccountId,
        counterparty: AccountId,
        operation: OperationId,
    },
    /// Counterparty log holds the id with different contents
    MismatchedCounterpart {
        account: AccountId,
        counterparty: AccountId,
        operation: OperationId,
    },
    /// Operation names an account outside the store
    UnknownCounterparty {
        account: AccountId,
        counterparty: AccountId,
        operation: OperationId,
    },
    /// Ledger length differs from the number of logged operations
    LedgerSize { ledger: usize, logged: usize },
    /// Ledger entry missing from, or different in, a participant's log
    LedgerEntryNotLogged { operation: OperationId },
}

impl Finding {
    /// Invariant this finding violates
    pub fn invariant(&self) -> Invariant {
        match self {
            Finding::TotalMismatch { .. } => Invariant::Conservation,
            Finding::BalanceMismatch { .. } | Finding::ForeignOperation { .. } => {
                Invariant::Derivability
            }
            Finding::DuplicateOperation { .. } => Invariant::Uniqueness,
            Finding::MissingCounterpart { .. }
            | Finding::MismatchedCounterpart { .. }
            | Finding::UnknownCounterparty { .. } => Invariant::Symmetry,
            Finding::LedgerSize { .. } | Finding::LedgerEntryNotLogged { .. } => {
                Invariant::Ledger
            }
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::TotalMismatch { expected, actual } => {
                write!(f, "total balance {} differs from opening total {}", actual, expected)
            }
            Finding::BalanceMismatch {
                account,
                balance,
                derived,
            } => match derived {
                Some(derived) => write!(
                    f,
                    "account {} balance {} differs from derived {}",
                    account, balance, derived
                ),
                None => write!(
                    f,
                    "account {} balance {} cannot be derived (overflow)",
                    account, balance
                ),
            },
            Finding::ForeignOperation { account, operation } => write!(
                f,
                "account {} logs operation {} that does not involve it",
                account, operation
            ),
            Finding::DuplicateOperation { account, operation } => write!(
                f,
                "operation id {} reused (seen in account {})",
                operation, account
            ),
            Finding::MissingCounterpart {
                account,
                counterparty,
                operation,
            } => write!(
                f,
                "operation {} in account {} missing from account {}",
                operation, account, counterparty
            ),
            Finding::MismatchedCounterpart {
                account,
                counterparty,
                operation,
            } => write!(
                f,
                "operation {} differs between accounts {} and {}",
                operation, account, counterparty
            ),
            Finding::UnknownCounterparty {
                account,
                counterparty,
                operation,
            } => write!(
                f,
                "operation {} in account {} names unknown account {}",
                operation, account, counterparty
            ),
            Finding::LedgerSize { ledger, logged } => write!(
                f,
                "ledger holds {} operations, logs hold {}",
                ledger, logged
            ),
            Finding::LedgerEntryNotLogged { operation } => write!(
                f,
                "ledger operation {} not logged identically by both parties",
                operation
            ),
        }
    }
}

/// Outcome of one audit pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// Mode the pass ran in
    pub mode: AuditMode,
    /// Accounts visited
    pub accounts_checked: usize,
    /// Log entries visited
    pub operations_checked: usize,
    /// Every failed check, in discovery order
    pub findings: Vec<Finding>,
    /// Counterparty misses that resolved on a re-read
    pub transient_misses: u64,
}

impl AuditReport {
    fn new(mode: AuditMode) -> Self {
        Self {
            mode,
            accounts_checked: 0,
            operations_checked: 0,
            findings: Vec::new(),
            transient_misses: 0,
        }
    }

    /// Whether no check failed
    pub fn is_consistent(&self) -> bool {
        self.findings.is_empty()
    }

    /// Whether every check of `invariant` passed
    pub fn passed(&self, invariant: Invariant) -> bool {
        self.failures(invariant).next().is_none()
    }

    /// Findings against `invariant`
    pub fn failures(&self, invariant: Invariant) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |finding| finding.invariant() == invariant)
    }

    /// Turn a failed report into a `ConsistencyViolation`
    pub fn into_result(self) -> Result<AuditReport, BankError> {
        match self.findings.first() {
            None => Ok(self),
            Some(first) => Err(BankError::ConsistencyViolation {
                violations: self.findings.len(),
                first: first.to_string(),
            }),
        }
    }

    /// Emit one pass/fail line per checked invariant
    pub fn log_verdicts(&self, auditor: &str) {
        for &invariant in Invariant::checked_in(self.mode) {
            let mut failures = self.failures(invariant);
            match failures.next() {
                None => info!(
                    auditor,
                    %invariant,
                    accounts = self.accounts_checked,
                    operations = self.operations_checked,
                    "consistency check passed"
                ),
                Some(first) => error!(
                    auditor,
                    %invariant,
                    failures = 1 + failures.count(),
                    first = %first,
                    "consistency check failed"
                ),
            }
        }
        if self.transient_misses > 0 {
            warn!(
                auditor,
                misses = self.transient_misses,
                "counterparty misses resolved on re-read"
            );
        }
    }
}

/// Check one account's own log: derivability, foreign entries, repeated ids
fn check_own_log(account: &Account, report: &mut AuditReport) {
    if account.derived_balance() != Some(account.balance) {
        report.findings.push(Finding::BalanceMismatch {
            account: account.id,
            balance: account.balance,
            derived: account.derived_balance(),
        });
    }

    let mut seen: HashSet<OperationId> = HashSet::with_capacity(account.operations.len());
    for operation in &account.operations {
        if operation.counterparty(account.id).is_none() {
            report.findings.push(Finding::ForeignOperation {
                account: account.id,
                operation: operation.id,
            });
        }
        if !seen.insert(operation.id) {
            report.findings.push(Finding::DuplicateOperation {
                account: account.id,
                operation: operation.id,
            });
        }
    }
}

/// Operations of one counterparty, indexed by id, with the pass-local time the
/// log was read
struct CachedLog {
    read_at: u64,
    operations: HashMap<OperationId, Operation>,
}

impl CachedLog {
    fn read(store: &AccountStore, id: AccountId, read_at: u64) -> Result<Self, BankError> {
        let guard = store.lock(id)?;
        let operations = guard
            .get()
            .operations
            .iter()
            .map(|op| (op.id, *op))
            .collect();
        Ok(Self {
            read_at,
            operations,
        })
    }
}

/// Online audit of `ids`, locking one account at a time
///
/// `ids` are visited in ascending order. A counterparty log read before the
/// audited account's snapshot is re-read once for free when it lacks an
/// operation; a miss against a fresh read is re-read up to
/// `symmetry_retries` more times before it is recorded. Misses that resolve
/// are counted in [`AuditReport::transient_misses`].
///
/// # Errors
///
/// `UnknownAccount` if `ids` names an account outside the store.
pub fn audit_online(
    store: &AccountStore,
    ids: &[AccountId],
    symmetry_retries: u32,
) -> Result<AuditReport, BankError> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let mut report = AuditReport::new(AuditMode::Online);
    let mut clock: u64 = 0;
    let mut cache: HashMap<AccountId, CachedLog> = HashMap::new();

    for id in ids {
        let snapshot = store.lock(id)?.snapshot();
        clock += 1;
        let snapshot_at = clock;

        report.accounts_checked += 1;
        check_own_log(&snapshot, &mut report);

        for operation in &snapshot.operations {
            report.operations_checked += 1;
            let Some(counterparty) = operation.counterparty(id) else {
                continue;
            };
            if let Some(finding) = check_counterpart(
                store,
                &mut cache,
                &mut clock,
                snapshot_at,
                id,
                counterparty,
                operation,
                symmetry_retries,
                &mut report.transient_misses,
            ) {
                report.findings.push(finding);
            }
        }
    }

    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn check_counterpart(
    store: &AccountStore,
    cache: &mut HashMap<AccountId, CachedLog>,
    clock: &mut u64,
    snapshot_at: u64,
    account: AccountId,
    counterparty: AccountId,
    operation: &Operation,
    symmetry_retries: u32,
    transient_misses: &mut u64,
) -> Option<Finding> {
    let mut retries_left = symmetry_retries;
    let mut missed = false;

    loop {
        let log = match cache.entry(counterparty) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                *clock += 1;
                match CachedLog::read(store, counterparty, *clock) {
                    Ok(log) => entry.insert(log),
                    Err(_) => {
                        return Some(Finding::UnknownCounterparty {
                            account,
                            counterparty,
                            operation: operation.id,
                        })
                    }
                }
            }
        };

        match log.operations.get(&operation.id) {
            Some(found) if found == operation => {
                if missed {
                    *transient_misses += 1;
                }
                return None;
            }
            Some(_) => {
                return Some(Finding::MismatchedCounterpart {
                    account,
                    counterparty,
                    operation: operation.id,
                })
            }
            None => {}
        }

        // A read older than the snapshot may predate the commit; re-read it
        // without spending a retry.
        let stale = log.read_at < snapshot_at;
        if !stale {
            missed = true;
            if retries_left == 0 {
                return Some(Finding::MissingCounterpart {
                    account,
                    counterparty,
                    operation: operation.id,
                });
            }
            retries_left -= 1;
            std::thread::yield_now();
        }
        cache.remove(&counterparty);
    }
}

/// Strict audit of the whole store, holding every account lock
///
/// Transfers that are in flight when the audit starts complete before it can
/// take their locks; transfers that start afterwards wait until it finishes.
pub fn audit_strict(store: &AccountStore) -> AuditReport {
    let guards = store.lock_all();
    let accounts: Vec<&Account> = guards.iter().map(|guard| guard.get()).collect();
    let mut report = AuditReport::new(AuditMode::Strict);

    let total = accounts
        .iter()
        .try_fold(0i64, |sum, account| sum.checked_add(account.balance));
    let expected = store.total_initial_balance();
    if total != Some(expected) {
        report.findings.push(Finding::TotalMismatch {
            expected,
            actual: total.unwrap_or(i64::MAX),
        });
    }

    let indexes: Vec<HashMap<OperationId, &Operation>> = accounts
        .iter()
        .map(|account| account.operations.iter().map(|op| (op.id, op)).collect())
        .collect();
    let mut distinct: HashMap<OperationId, &Operation> = HashMap::new();

    for account in &accounts {
        report.accounts_checked += 1;
        check_own_log(account, &mut report);

        for operation in &account.operations {
            report.operations_checked += 1;

            match distinct.entry(operation.id) {
                Entry::Vacant(entry) => {
                    entry.insert(operation);
                }
                Entry::Occupied(entry) if *entry.get() != operation => {
                    report.findings.push(Finding::DuplicateOperation {
                        account: account.id,
                        operation: operation.id,
                    });
                }
                Entry::Occupied(_) => {}
            }

            let Some(counterparty) = operation.counterparty(account.id) else {
                continue;
            };
            let finding = match indexes.get(counterparty as usize) {
                None => Some(Finding::UnknownCounterparty {
                    account: account.id,
                    counterparty,
                    operation: operation.id,
                }),
                Some(index) => match index.get(&operation.id) {
                    Some(found) if *found == operation => None,
                    Some(_) => Some(Finding::MismatchedCounterpart {
                        account: account.id,
                        counterparty,
                        operation: operation.id,
                    }),
                    None => Some(Finding::MissingCounterpart {
                        account: account.id,
                        counterparty,
                        operation: operation.id,
                    }),
                },
            };
            report.findings.extend(finding);
        }
    }

    // Ledger mutex is taken after the account locks, as transfers do
    let ledger = store.ledger();
    if ledger.len() != distinct.len() {
        report.findings.push(Finding::LedgerSize {
            ledger: ledger.len(),
            logged: distinct.len(),
        });
    }
    for entry in &ledger {
        let logged_by = |id: AccountId| {
            indexes
                .get(id as usize)
                .and_then(|index| index.get(&entry.id))
                .is_some_and(|found| *found == entry)
        };
        if !logged_by(entry.sender_id) || !logged_by(entry.receiver_id) {
            report.findings.push(Finding::LedgerEntryNotLogged {
                operation: entry.id,
            });
        }
    }

    drop(guards);
    report
}

/// Counters kept by an auditor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    /// Completed passes
    pub passes: u64,
    /// Passes with at least one finding
    pub failed_passes: u64,
    /// Total findings over all passes
    pub findings: u64,
    /// Counterparty misses that resolved on a re-read
    pub transient_misses: u64,
}

impl AuditStats {
    /// Add another auditor's counters to these
    pub fn merge(&mut self, other: &AuditStats) {
        self.passes += other.passes;
        self.failed_passes += other.failed_passes;
        self.findings += other.findings;
        self.transient_misses += other.transient_misses;
    }

    fn record(&mut self, report: &AuditReport) {
        self.passes += 1;
        if !report.is_consistent() {
            self.failed_passes += 1;
        }
        self.findings += report.findings.len() as u64;
        self.transient_misses += report.transient_misses;
    }
}

/// Repeatedly audits the store while transfers run
#[derive(Debug)]
pub struct ConsistencyAuditor {
    name: String,
    store: Arc<AccountStore>,
    scope: AuditScope,
    mode: AuditMode,
    symmetry_retries: u32,
    rng: ChaCha8Rng,
    stats: AuditStats,
    last_report: Option<AuditReport>,
}

impl ConsistencyAuditor {
    /// Create an auditor
    ///
    /// `seed` only matters for [`AuditScope::Sample`].
    ///
    /// # Errors
    ///
    /// `UnknownAccount` if an [`AuditScope::Ids`] entry is outside the store,
    /// `InvalidConfig` for an empty sample.
    pub fn new(
        index: usize,
        store: Arc<AccountStore>,
        scope: AuditScope,
        mode: AuditMode,
        symmetry_retries: u32,
        seed: u64,
    ) -> Result<Self, BankError> {
        match &scope {
            AuditScope::Ids(ids) => {
                if let Some(&unknown) = ids.iter().find(|&&id| id as usize >= store.len()) {
                    return Err(BankError::unknown_account(unknown));
                }
            }
            AuditScope::Sample(0) => {
                return Err(BankError::invalid_config("audit sample size must be positive"))
            }
            _ => {}
        }

        Ok(Self {
            name: format!("auditor-{}", index),
            store,
            scope,
            mode,
            symmetry_retries,
            rng: ChaCha8Rng::seed_from_u64(seed),
            stats: AuditStats::default(),
            last_report: None,
        })
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> AuditStats {
        self.stats
    }

    /// Report of the most recent pass
    pub fn last_report(&self) -> Option<&AuditReport> {
        self.last_report.as_ref()
    }

    /// Accounts for the next online pass, ascending
    fn select(&mut self) -> Vec<AccountId> {
        let count = self.store.len();
        let mut ids: Vec<AccountId> = match &self.scope {
            AuditScope::All => self.store.ids().collect(),
            AuditScope::Sample(size) => sample(&mut self.rng, count, (*size).min(count))
                .into_iter()
                .map(|index| index as AccountId)
                .collect(),
            AuditScope::Ids(ids) => ids.clone(),
        };
        ids.sort_unstable();
        ids
    }

    /// Run one pass and return its report
    pub fn audit(&mut self) -> Result<AuditReport, BankError> {
        let report = match self.mode {
            AuditMode::Online => {
                let ids = self.select();
                audit_online(&self.store, &ids, self.symmetry_retries)?
            }
            AuditMode::Strict => audit_strict(&self.store),
        };
        report.log_verdicts(&self.name);
        self.stats.record(&report);
        Ok(report)
    }
}

impl Actor for ConsistencyAuditor {
    fn name(&self) -> &str {
        &self.name
    }

    fn iteration(&mut self) -> Result<(), BankError> {
        let report = self.audit()?;
        self.last_report = Some(report);
        Ok(())
    }
}
