use safeseq_types::Transaction;
use std::collections::BTreeMap;

/// Per-account holding buffer for transactions that have arrived but are
/// not yet releasable.
///
/// Keyed by nonce in a `BTreeMap`, so insertion is O(log n), the minimum
/// pending nonce is always the first entry, and nonce uniqueness is
/// enforced by the map itself. Popped entries leave the map entirely;
/// nothing already released can ever re-enter ordering.
#[derive(Debug, Default)]
pub struct Waitlist {
    pending: BTreeMap<u64, Transaction>,
}

impl Waitlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction, keeping nonce order. Returns false without
    /// mutating anything if the nonce is already waitlisted.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if self.pending.contains_key(&tx.nonce) {
            return false;
        }
        self.pending.insert(tx.nonce, tx);
        true
    }

    /// The transaction with the lowest pending nonce, if any. Never mutates.
    pub fn peek(&self) -> Option<&Transaction> {
        self.pending.first_key_value().map(|(_, tx)| tx)
    }

    /// Remove and return the transaction with the lowest pending nonce.
    /// The returned value is owned; the waitlist no longer references it.
    pub fn pop(&mut self) -> Option<Transaction> {
        self.pending.pop_first().map(|(_, tx)| tx)
    }

    /// Drop every pending transaction with a nonce below `floor`.
    /// Returns the number removed.
    pub fn purge_below(&mut self, floor: u64) -> usize {
        let keep = self.pending.split_off(&floor);
        let purged = self.pending.len();
        self.pending = keep;
        purged
    }

    /// Count of currently pending transactions.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tx(nonce: u64) -> Transaction {
        Transaction::new(format!("tx-{nonce}"), "acct", nonce, "", "")
    }

    #[test]
    fn add_keeps_nonce_order() {
        let mut wl = Waitlist::new();
        for n in [5u64, 3, 4, 6] {
            assert!(wl.add(tx(n)));
        }
        assert_eq!(wl.len(), 4);
        assert_eq!(wl.peek().unwrap().nonce, 3);
    }

    #[test]
    fn add_rejects_duplicate_nonce() {
        let mut wl = Waitlist::new();
        assert!(wl.add(tx(3)));
        let dup = Transaction::new("other-id", "acct", 3, "different", "");
        assert!(!wl.add(dup));

        // First writer wins, state untouched
        assert_eq!(wl.len(), 1);
        assert_eq!(wl.peek().unwrap().id, "tx-3");
    }

    #[test]
    fn peek_is_idempotent() {
        let mut wl = Waitlist::new();
        wl.add(tx(2));
        wl.add(tx(1));

        for _ in 0..10 {
            assert_eq!(wl.peek().unwrap().nonce, 1);
        }
        assert_eq!(wl.len(), 2);
        assert_eq!(wl.pop().unwrap().nonce, 1);
        assert_eq!(wl.pop().unwrap().nonce, 2);
    }

    #[test]
    fn purge_below_drops_only_stale_entries() {
        let mut wl = Waitlist::new();
        for n in [1u64, 2, 5] {
            wl.add(tx(n));
        }

        assert_eq!(wl.purge_below(3), 2);
        assert_eq!(wl.len(), 1);
        assert_eq!(wl.peek().unwrap().nonce, 5);

        // Floor below everything pending removes nothing
        assert_eq!(wl.purge_below(0), 0);
        assert_eq!(wl.len(), 1);
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let mut wl = Waitlist::new();
        assert!(wl.pop().is_none());
        assert!(wl.peek().is_none());
        assert_eq!(wl.len(), 0);
    }

    #[test]
    fn popped_value_is_independent_of_storage() {
        let mut wl = Waitlist::new();
        wl.add(tx(1));
        let popped = wl.pop().unwrap();

        // Re-using the nonce slot must not affect the popped value
        wl.add(Transaction::new("replacement", "acct", 1, "new", ""));
        assert_eq!(popped.id, "tx-1");
        assert_eq!(wl.peek().unwrap().id, "replacement");
    }

    proptest! {
        #[test]
        fn pops_ascend_for_any_insertion_order(mut nonces in proptest::collection::vec(0u64..1000, 1..50)) {
            let mut wl = Waitlist::new();
            for &n in &nonces {
                wl.add(tx(n));
            }

            nonces.sort_unstable();
            nonces.dedup();
            prop_assert_eq!(wl.len(), nonces.len());

            let mut released = Vec::new();
            while let Some(tx) = wl.pop() {
                released.push(tx.nonce);
            }
            prop_assert_eq!(released, nonces);
        }
    }
}
