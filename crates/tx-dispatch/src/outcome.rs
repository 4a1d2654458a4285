use crate::Batch;
use solana_sdk::signature::Signature;
use std::ops::Range;
use tokio::time::Instant;

/// Why a batch was rejected. Rejections are terminal and never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The wallet or an extra signer refused to sign
    SigningDeclined(String),
    /// The ledger executed the transaction and reported a failure
    Network(String),
}

/// Why an attempt ended without a terminal signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The status poll budget ran out
    PollsExhausted,
    /// The attempt or dispatch deadline passed first
    Deadline,
    /// No attempt was made, for example because no checkpoint could be fetched
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed { signature: Signature, slot: u64 },
    Rejected(Rejection),
    TimedOut(Expiry),
}

impl Outcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed { .. })
    }

    /// Confirmed and rejected outcomes are final for a batch
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::TimedOut(_))
    }
}

/// One round's effort to land a batch
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    /// Signature of the transaction used, absent when signing failed
    pub signature: Option<Signature>,
    pub started_at: Instant,
    pub outcome: Outcome,
}

impl SubmissionAttempt {
    /// The wallet or an extra signer refused; nothing was sent
    pub(crate) fn declined(started_at: Instant, reason: String) -> Self {
        Self {
            signature: None,
            started_at,
            outcome: Outcome::Rejected(Rejection::SigningDeclined(reason)),
        }
    }

    /// The deadline passed before the transaction was signed
    pub(crate) fn expired_unsigned(started_at: Instant) -> Self {
        Self {
            signature: None,
            started_at,
            outcome: Outcome::TimedOut(Expiry::Deadline),
        }
    }
}

/// Final state of one batch after all rounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Indices of the batch's operations in the caller's list
    pub operations: Range<usize>,
    pub outcome: Outcome,
    /// Number of rounds in which the batch was submitted
    pub attempts: usize,
    pub last_signature: Option<Signature>,
}

impl BatchReport {
    pub(crate) fn not_attempted(batch: &Batch) -> Self {
        Self {
            operations: batch.operation_range(),
            outcome: Outcome::TimedOut(Expiry::NotAttempted),
            attempts: 0,
            last_signature: None,
        }
    }

    pub(crate) fn record(&mut self, attempt: SubmissionAttempt) {
        self.attempts += 1;
        if attempt.signature.is_some() {
            self.last_signature = attempt.signature;
        }
        self.outcome = attempt.outcome;
    }
}

/// Report returned by a dispatch call
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Success flag for every operation, in the caller's original order
    pub per_operation_success: Vec<bool>,
    pub succeeded: usize,
    pub total: usize,
    pub batches: Vec<BatchReport>,
    /// Rounds executed, summed over all waves
    pub rounds_run: usize,
}

impl DispatchResult {
    pub(crate) fn from_reports(total: usize, batches: Vec<BatchReport>, rounds_run: usize) -> Self {
        let mut per_operation_success = vec![false; total];
        for report in &batches {
            if report.outcome.is_confirmed() {
                per_operation_success[report.operations.clone()].fill(true);
            }
        }
        let succeeded = per_operation_success.iter().filter(|ok| **ok).count();

        Self {
            per_operation_success,
            succeeded,
            total,
            batches,
            rounds_run,
        }
    }

    pub fn is_complete_success(&self) -> bool {
        self.succeeded == self.total
    }

    pub fn operations_per_batch(&self) -> Vec<usize> {
        self.batches.iter().map(|b| b.operations.len()).collect()
    }

    /// Indices of operations whose batch did not confirm, for re-dispatching
    pub fn failed_operation_indices(&self) -> Vec<usize> {
        self.per_operation_success
            .iter()
            .enumerate()
            .filter_map(|(index, ok)| (!ok).then_some(index))
            .collect()
    }
}
