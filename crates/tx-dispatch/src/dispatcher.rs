use crate::{
    packer,
    submitter::{ensure_signed, within},
    Batch, BatchReport, DispatchConfig, DispatchError, DispatchResult, Expiry, Ledger,
    LedgerError, LogicalOperation, Outcome, SubmissionAttempt, Submitter, WalletSigner,
};
use backoff::future::retry;
use futures::{stream, StreamExt};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use solana_sdk::{hash::Hash, pubkey::Pubkey, transaction::Transaction};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Packs logical operations into transactions, submits them concurrently and
/// retries timed-out batches for a bounded number of rounds
pub struct Dispatcher<L: ?Sized> {
    ledger: Arc<L>,
    signer: Arc<dyn WalletSigner>,
    config: DispatchConfig,
}

impl<L: Ledger + ?Sized> Dispatcher<L> {
    /// Create a dispatcher with default configuration
    pub fn new(ledger: Arc<L>, signer: Arc<dyn WalletSigner>) -> Self {
        Self::with_config(ledger, signer, DispatchConfig::default())
    }

    pub fn with_config(
        ledger: Arc<L>,
        signer: Arc<dyn WalletSigner>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            ledger,
            signer,
            config,
        }
    }

    pub fn fee_payer(&self) -> Pubkey {
        self.signer.fee_payer()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Preview how `operations` would be split into transactions, without any network I/O
    pub fn pack(&self, operations: Vec<LogicalOperation>) -> Result<Vec<Batch>, DispatchError> {
        self.config.validate()?;
        Ok(packer::pack(
            operations,
            &self.fee_payer(),
            self.config.size_ceiling,
        )?)
    }

    /// Deliver `operations` and report, per operation, whether it landed.
    ///
    /// Only configuration problems are returned as errors, and they are
    /// detected before anything is sent. Partial failure is reported in the
    /// result.
    pub async fn dispatch(
        &self,
        operations: Vec<LogicalOperation>,
    ) -> Result<DispatchResult, DispatchError> {
        let total = operations.len();
        let batches = self.pack(operations)?;
        let hard_deadline = self
            .config
            .dispatch_deadline()
            .map(|deadline| Instant::now() + deadline);

        let mut rng = match self.config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let submitter = Submitter::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.signer),
            &self.config,
        );

        let mut reports: Vec<BatchReport> =
            batches.iter().map(BatchReport::not_attempted).collect();
        let indices: Vec<usize> = (0..batches.len()).collect();
        let wave_count = indices.len().div_ceil(self.config.max_batches_per_wave);
        let mut rounds_run = 0;

        info!(
            "Dispatching {} operations in {} transactions ({} waves)",
            total,
            batches.len(),
            wave_count
        );

        for (wave, members) in indices
            .chunks(self.config.max_batches_per_wave)
            .enumerate()
        {
            rounds_run += self
                .run_wave(
                    &submitter,
                    &batches,
                    members,
                    &mut reports,
                    hard_deadline,
                    &mut rng,
                )
                .await;

            debug!("Wave {} of {} finished", wave + 1, wave_count);
        }

        let result = DispatchResult::from_reports(total, reports, rounds_run);
        info!(
            "Dispatch finished: {} of {} operations succeeded in {} rounds",
            result.succeeded, result.total, result.rounds_run
        );
        Ok(result)
    }

    /// Run up to `max_rounds` rounds over one wave of batches, returning the number of rounds run
    async fn run_wave(
        &self,
        submitter: &Submitter<L>,
        batches: &[Batch],
        members: &[usize],
        reports: &mut [BatchReport],
        hard_deadline: Option<Instant>,
        rng: &mut StdRng,
    ) -> usize {
        let mut pending = members.to_vec();
        let mut round = 0;

        while !pending.is_empty() && round < self.config.max_rounds {
            if past(hard_deadline) {
                expire(&pending, reports);
                break;
            }

            // Reshuffle so the same batch does not always go last
            if round > 0 {
                pending.shuffle(rng);
            }
            round += 1;

            let checkpoint = match within(hard_deadline, self.fetch_checkpoint()).await {
                Some(Ok(checkpoint)) => checkpoint,
                Some(Err(e)) => {
                    warn!("Skipping round {}: no checkpoint available: {}", round, e);
                    continue;
                }
                None => {
                    expire(&pending, reports);
                    break;
                }
            };

            let Some(signed) = self
                .sign_round(submitter, batches, &pending, checkpoint, reports, hard_deadline)
                .await
            else {
                expire(&pending, reports);
                break;
            };

            info!(
                "Round {} of {}: sending {} transactions",
                round,
                self.config.max_rounds,
                signed.len()
            );

            let attempts: Vec<_> = stream::iter(signed)
                .map(|(index, transaction)| async move {
                    // Submissions queued behind the concurrency limit never start after the deadline
                    if past(hard_deadline) {
                        return (index, None);
                    }
                    let attempt = submitter.submit_signed(transaction, hard_deadline).await;
                    (index, Some(attempt))
                })
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

            for (index, attempt) in attempts {
                match attempt {
                    Some(attempt) => reports[index].record(attempt),
                    None => reports[index].outcome = Outcome::TimedOut(Expiry::Deadline),
                }
            }
            pending.retain(|&index| reports[index].outcome.is_retryable());

            info!("Round {} done, {} transactions need a retry", round, pending.len());
        }

        round
    }

    /// Build this round's transactions and have the wallet sign them in one
    /// request. Batches that cannot be signed are recorded as declined.
    ///
    /// Returns `None` if the deadline passed before the wallet answered.
    async fn sign_round(
        &self,
        submitter: &Submitter<L>,
        batches: &[Batch],
        pending: &[usize],
        checkpoint: Hash,
        reports: &mut [BatchReport],
        hard_deadline: Option<Instant>,
    ) -> Option<Vec<(usize, Transaction)>> {
        let requested_at = Instant::now();
        let mut indices = Vec::with_capacity(pending.len());
        let mut unsigned = Vec::with_capacity(pending.len());

        for &index in pending {
            match submitter.prepare(&batches[index], checkpoint) {
                Ok(transaction) => {
                    indices.push(index);
                    unsigned.push(transaction);
                }
                Err(e) => {
                    warn!("Co-signing failed for batch {}: {}", index, e);
                    reports[index].record(SubmissionAttempt::declined(requested_at, e.to_string()));
                }
            }
        }

        if indices.is_empty() {
            return Some(Vec::new());
        }

        let expected = indices.len();
        let signed = match within(hard_deadline, self.signer.sign_transactions(unsigned)).await? {
            Ok(signed) if signed.len() == expected => signed,
            Ok(signed) => {
                let reason = format!("wallet returned {} of {} transactions", signed.len(), expected);
                warn!("Signing failed for {} transactions: {}", expected, reason);
                for &index in &indices {
                    reports[index].record(SubmissionAttempt::declined(requested_at, reason.clone()));
                }
                return Some(Vec::new());
            }
            Err(e) => {
                warn!("Wallet declined {} transactions: {}", expected, e);
                for &index in &indices {
                    reports[index].record(SubmissionAttempt::declined(requested_at, e.to_string()));
                }
                return Some(Vec::new());
            }
        };

        let mut ready = Vec::with_capacity(expected);
        for (index, transaction) in indices.into_iter().zip(signed) {
            match ensure_signed(transaction) {
                Ok(transaction) => ready.push((index, transaction)),
                Err(e) => {
                    reports[index].record(SubmissionAttempt::declined(requested_at, e.to_string()))
                }
            }
        }
        Some(ready)
    }

    /// Fetch a checkpoint, retrying transient failures with exponential backoff
    async fn fetch_checkpoint(&self) -> Result<Hash, LedgerError> {
        let ledger = Arc::clone(&self.ledger);

        retry(self.config.checkpoint_backoff(), || {
            let ledger = Arc::clone(&ledger);
            async move {
                ledger.latest_checkpoint().await.map_err(|e| {
                    warn!("Checkpoint fetch failed: {}", e);
                    backoff::Error::transient(e)
                })
            }
        })
        .await
    }
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Mark every pending batch as cut off by the dispatch deadline
fn expire(pending: &[usize], reports: &mut [BatchReport]) {
    warn!(
        "Dispatch deadline passed with {} transactions unconfirmed",
        pending.len()
    );
    for &index in pending {
        reports[index].outcome = Outcome::TimedOut(Expiry::Deadline);
    }
}
