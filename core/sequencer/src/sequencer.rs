use crate::waitlist::Waitlist;
use safeseq_types::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("stale nonce: account {account} expects {expected}, got {got}")]
    StaleNonce {
        account: String,
        expected: u64,
        got: u64,
    },

    #[error("nonce {nonce} already waitlisted for account {account}")]
    DuplicateNonce { account: String, nonce: u64 },

    #[error("release queue congested, hand-off timed out after {timeout_ms}ms")]
    Congested { timeout_ms: u64 },

    #[error("release queue closed by consumer")]
    ReleaseClosed,
}

/// Sequencer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Capacity of the bounded release channel; must be positive,
    /// a zero is clamped to 1 at construction
    pub release_capacity: usize,

    /// Measured release-queue depth above which admission backs off
    pub congestion_threshold: usize,

    /// How long a hand-off may block on a full channel before `Congested`
    pub handoff_timeout_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            release_capacity: 16,
            congestion_threshold: 10,
            handoff_timeout_ms: 1000,
        }
    }
}

/// Everything mutated by an admission call lives under one lock, so an
/// `add` is atomic with respect to every other `add` and `drain_account`.
#[derive(Debug, Default)]
struct SequencerState {
    /// Account id to waitlist mapping, created lazily per account
    waitlists: HashMap<String, Waitlist>,

    /// Next nonce each account is expected to release; absent means 0
    next_nonce: HashMap<String, u64>,
}

impl SequencerState {
    fn expected(&self, account: &str) -> u64 {
        self.next_nonce.get(account).copied().unwrap_or(0)
    }
}

/// Per-account transaction admission sequencer.
///
/// Buffers out-of-order arrivals in per-account waitlists and releases them
/// to a bounded downstream channel strictly in nonce order, one nonce at a
/// time, never skipping or duplicating a nonce. Accounts are independent: a
/// gap in one account's sequence never blocks another account's releases.
///
/// The hand-off is peek-send-commit under the state lock: the eligible
/// transaction is cloned and sent first, and the waitlist pop plus cursor
/// advance happen only after the send has succeeded, with no await point in
/// between. A timed-out or cancelled hand-off therefore leaves the
/// transaction waitlisted and the cursor unmoved, so a later call retries
/// the same nonce.
pub struct Sequencer {
    config: SequencerConfig,
    state: Mutex<SequencerState>,
    release: mpsc::Sender<Transaction>,
}

impl Sequencer {
    /// Create a sequencer and the receiving end of its release queue. The
    /// receiver is handed to the downstream execution layer; dropping it
    /// makes further releases fail with `ReleaseClosed`.
    pub fn new(config: SequencerConfig) -> (Self, mpsc::Receiver<Transaction>) {
        let (release, rx) = mpsc::channel(config.release_capacity.max(1));
        let sequencer = Self {
            config,
            state: Mutex::new(SequencerState::default()),
            release,
        };
        (sequencer, rx)
    }

    /// Submit one transaction for an account.
    ///
    /// Waitlists the transaction, then releases at most one eligible
    /// transaction for that account. Returns `Ok(true)` when a hand-off
    /// happened, `Ok(false)` when the transaction was waitlisted but
    /// nothing was releasable yet (nonce gap, or the release queue is
    /// above its congestion threshold); both leave the transaction
    /// retrievable by a later `add` or `drain_account`.
    ///
    /// Even when several consecutive nonces are already eligible, a single
    /// call releases at most one; `drain_account` flushes a whole run.
    pub async fn add(&self, account: &str, tx: Transaction) -> Result<bool, SequencerError> {
        let mut state = self.state.lock().await;

        let expected = state.expected(account);
        if tx.nonce < expected {
            warn!(account, nonce = tx.nonce, expected, "rejecting stale nonce");
            return Err(SequencerError::StaleNonce {
                account: account.to_string(),
                expected,
                got: tx.nonce,
            });
        }

        let nonce = tx.nonce;
        let waitlist = state.waitlists.entry(account.to_string()).or_default();
        if !waitlist.add(tx) {
            warn!(account, nonce, "rejecting duplicate nonce");
            return Err(SequencerError::DuplicateNonce {
                account: account.to_string(),
                nonce,
            });
        }
        debug!(account, nonce, pending = waitlist.len(), "waitlisted");

        if self.queue_length() > self.config.congestion_threshold {
            debug!(
                account,
                depth = self.queue_length(),
                "release queue congested, deferring"
            );
            return Ok(false);
        }

        self.release_next(&mut state, account).await
    }

    /// Release every currently eligible transaction for an account,
    /// stopping at the first nonce gap or the first sign of congestion.
    /// Returns the number of transactions handed off.
    pub async fn drain_account(&self, account: &str) -> Result<usize, SequencerError> {
        let mut state = self.state.lock().await;
        let mut released = 0;

        loop {
            if self.queue_length() > self.config.congestion_threshold {
                debug!(account, released, "drain stopping on congestion");
                break;
            }
            match self.release_next(&mut state, account).await {
                Ok(true) => released += 1,
                Ok(false) => break,
                Err(SequencerError::Congested { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(released)
    }

    /// Hand off the account's lowest waiting nonce if it is the expected
    /// one. Called with the state lock held; commits the pop and cursor
    /// advance only after the send has succeeded.
    async fn release_next(
        &self,
        state: &mut SequencerState,
        account: &str,
    ) -> Result<bool, SequencerError> {
        let expected = state.expected(account);

        // Only the exact expected nonce may release; anything below the
        // cursor is stale and must never move the cursor backward
        let candidate = match state.waitlists.get(account).and_then(Waitlist::peek) {
            Some(head) if head.nonce == expected => head.clone(),
            // Empty waitlist, or the gap has not closed yet
            _ => return Ok(false),
        };
        let nonce = candidate.nonce;

        let timeout = Duration::from_millis(self.config.handoff_timeout_ms);
        match tokio::time::timeout(timeout, self.release.send(candidate)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(SequencerError::ReleaseClosed),
            Err(_) => {
                warn!(
                    account,
                    nonce,
                    timeout_ms = self.config.handoff_timeout_ms,
                    "hand-off timed out, transaction stays waitlisted"
                );
                return Err(SequencerError::Congested {
                    timeout_ms: self.config.handoff_timeout_ms,
                });
            }
        }

        // Send succeeded; commit. No await between here and return, so the
        // released transaction can neither be dropped nor duplicated.
        if let Some(waitlist) = state.waitlists.get_mut(account) {
            waitlist.pop();
        }
        state.next_nonce.insert(account.to_string(), nonce + 1);

        info!(account, nonce, "released");
        Ok(true)
    }

    /// Seed or overwrite an account's expected next nonce. The embedding
    /// process calls this with the account's committed nonce; unseeded
    /// accounts start at 0. Waitlisted entries below the new cursor are
    /// stale by the caller's own declaration and are discarded, so they
    /// can never release or rewind the cursor.
    pub async fn set_next_nonce(&self, account: &str, nonce: u64) {
        let mut state = self.state.lock().await;
        if let Some(waitlist) = state.waitlists.get_mut(account) {
            let purged = waitlist.purge_below(nonce);
            if purged > 0 {
                debug!(account, nonce, purged, "discarded stale waitlisted entries");
            }
        }
        state.next_nonce.insert(account.to_string(), nonce);
    }

    /// The nonce an account is expected to release next.
    pub async fn next_nonce(&self, account: &str) -> u64 {
        self.state.lock().await.expected(account)
    }

    /// Current depth of the release queue.
    pub fn queue_length(&self) -> usize {
        self.release.max_capacity() - self.release.capacity()
    }

    /// Pending backlog for one account.
    pub async fn waitlist_len(&self, account: &str) -> usize {
        self.state
            .lock()
            .await
            .waitlists
            .get(account)
            .map_or(0, Waitlist::len)
    }

    /// Snapshot of queue depth and pending backlog.
    pub async fn stats(&self) -> SequencerStats {
        let state = self.state.lock().await;
        SequencerStats {
            queued: self.queue_length(),
            pending: state.waitlists.values().map(Waitlist::len).sum(),
            accounts: state.waitlists.len(),
        }
    }
}

/// Sequencer statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerStats {
    /// Transactions sitting in the release queue
    pub queued: usize,

    /// Transactions waitlisted across all accounts
    pub pending: usize,

    /// Accounts with a waitlist (live for the process lifetime)
    pub accounts: usize,
}
