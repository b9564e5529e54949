use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single submitted transaction.
///
/// Immutable after creation: the sequencer never mutates a transaction, it
/// only moves clones of it between its waitlist and the release queue. All
/// fields deep-copy on `clone()`, so a clone handed across an ownership
/// boundary is independent of the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque unique identifier, assigned by the producer
    pub id: String,

    /// Account whose nonce sequence this transaction belongs to
    pub account_id: String,

    /// Caller-assigned sequence number, unique per account
    pub nonce: u64,

    /// Opaque payload, interpreted only by the execution layer
    pub payload: String,

    /// Free-form metadata attached by the producer
    pub metadata: String,

    /// Creation timestamp, stamped by `new`
    pub created_on: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        nonce: u64,
        payload: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            nonce,
            payload: payload.into(),
            metadata: metadata.into(),
            created_on: Utc::now(),
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.id, self.account_id, self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_independent() {
        let tx = Transaction::new("tx-1", "alice", 7, "payload", "meta");
        let mut copy = tx.clone();
        copy.payload.push_str("-mutated");

        assert_eq!(tx.payload, "payload");
        assert_eq!(copy.nonce, tx.nonce);
    }

    #[test]
    fn serde_round_trip() {
        let tx = Transaction::new("tx-1", "alice", 7, "payload", "meta");
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn display_names_account_and_nonce() {
        let tx = Transaction::new("tx-9", "bob", 3, "", "");
        assert_eq!(tx.to_string(), "tx-9@bob#3");
    }
}
