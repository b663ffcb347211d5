//! Operation records for committed transfers
//!
//! An [`Operation`] is created exactly once per successful transfer and is
//! stored, unchanged, in both the sender's and the receiver's log.

use super::account::AccountId;
use std::fmt;

/// Operation identifier
///
/// Assigned from a process-wide atomic counter, never reused.
pub type OperationId = u64;

/// Immutable record of one committed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    /// Globally unique, monotonically assigned id
    pub id: OperationId,

    /// Account the funds left
    pub sender_id: AccountId,

    /// Account the funds arrived in
    pub receiver_id: AccountId,

    /// Transferred amount, always positive
    pub amount: i64,
}

impl Operation {
    /// The other party of this operation as seen from `account`
    ///
    /// Returns `None` when the operation does not involve `account`.
    pub fn counterparty(&self, account: AccountId) -> Option<AccountId> {
        if self.sender_id == account {
            Some(self.receiver_id)
        } else if self.receiver_id == account {
            Some(self.sender_id)
        } else {
            None
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OPERATION {{id: {}; senderId: {}; receiverId: {}; amount: {}}}",
            self.id, self.sender_id, self.receiver_id, self.amount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::as_sender(0, Some(1))]
    #[case::as_receiver(1, Some(0))]
    #[case::uninvolved(2, None)]
    fn test_counterparty(#[case] account: AccountId, #[case] expected: Option<AccountId>) {
        let op = Operation {
            id: 9,
            sender_id: 0,
            receiver_id: 1,
            amount: 200,
        };
        assert_eq!(op.counterparty(account), expected);
    }

    #[test]
    fn test_display_format() {
        let op = Operation {
            id: 3,
            sender_id: 0,
            receiver_id: 1,
            amount: 200,
        };
        assert_eq!(
            op.to_string(),
            "OPERATION {id: 3; senderId: 0; receiverId: 1; amount: 200}"
        );
    }
}
