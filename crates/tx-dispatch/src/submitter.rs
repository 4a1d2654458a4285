use crate::{
    Batch, ConfirmationWatcher, DispatchConfig, Expiry, Ledger, Outcome, Rejection,
    SubmissionAttempt, WalletSigner, WatchState,
};
use futures::{stream::FuturesUnordered, StreamExt};
use solana_sdk::{
    hash::Hash,
    message::Message,
    signature::Keypair,
    signer::SignerError,
    transaction::Transaction,
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::{interval_at, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Signs one batch against a checkpoint, broadcasts it until a terminal
/// signal arrives and reports the outcome
pub struct Submitter<L: ?Sized> {
    ledger: Arc<L>,
    signer: Arc<dyn WalletSigner>,
    watcher: ConfirmationWatcher<L>,
    rebroadcast_interval: Duration,
    per_attempt_timeout: Duration,
}

impl<L: Ledger + ?Sized> Submitter<L> {
    pub fn new(ledger: Arc<L>, signer: Arc<dyn WalletSigner>, config: &DispatchConfig) -> Self {
        let watcher = ConfirmationWatcher::new(
            Arc::clone(&ledger),
            config.poll_interval(),
            config.max_status_polls,
        );

        Self {
            ledger,
            signer,
            watcher,
            rebroadcast_interval: config.rebroadcast_interval(),
            per_attempt_timeout: config.per_attempt_timeout(),
        }
    }

    /// Sign `batch` against `checkpoint` with the wallet and submit it.
    ///
    /// Signing is bounded by `hard_deadline`; if it passes first nothing is
    /// sent. The per-attempt timeout starts once the transaction is signed.
    pub async fn submit(
        &self,
        batch: &Batch,
        checkpoint: Hash,
        hard_deadline: Option<Instant>,
    ) -> SubmissionAttempt {
        let requested_at = Instant::now();
        let signing = async {
            let transaction = self.prepare(batch, checkpoint)?;
            let transaction = self.signer.sign_transaction(transaction).await?;
            ensure_signed(transaction)
        };

        match within(hard_deadline, signing).await {
            Some(Ok(transaction)) => self.submit_signed(transaction, hard_deadline).await,
            Some(Err(e)) => {
                warn!(
                    "Signing declined for operations {:?}: {}",
                    batch.operation_range(),
                    e
                );
                SubmissionAttempt::declined(requested_at, e.to_string())
            }
            None => {
                warn!(
                    "Deadline passed while signing operations {:?}",
                    batch.operation_range()
                );
                SubmissionAttempt::expired_unsigned(requested_at)
            }
        }
    }

    /// Build the unsigned transaction for `batch`, carrying the signatures of
    /// its extra signers. The wallet signature is still missing.
    pub fn prepare(&self, batch: &Batch, checkpoint: Hash) -> Result<Transaction, SignerError> {
        let message = Message::new_with_blockhash(
            &batch.instructions(),
            Some(&self.signer.fee_payer()),
            &checkpoint,
        );
        let mut transaction = Transaction::new_unsigned(message);

        let extra_signers = batch.extra_signers();
        if !extra_signers.is_empty() {
            let keypairs: Vec<&Keypair> = extra_signers.iter().map(|k| k.as_ref()).collect();
            transaction.try_partial_sign(keypairs.as_slice(), checkpoint)?;
        }

        Ok(transaction)
    }

    /// Broadcast a fully signed transaction and watch it until it resolves,
    /// the per-attempt timeout passes or `hard_deadline` passes.
    ///
    /// Broadcasts never block the watch: a send still pending when the watch
    /// resolves is abandoned.
    pub async fn submit_signed(
        &self,
        transaction: Transaction,
        hard_deadline: Option<Instant>,
    ) -> SubmissionAttempt {
        let started_at = Instant::now();
        let mut deadline = started_at + self.per_attempt_timeout;
        if let Some(hard_deadline) = hard_deadline {
            deadline = deadline.min(hard_deadline);
        }
        let signature = transaction.signatures[0];

        // The first broadcast may be dropped silently; the rebroadcast loop covers it
        let mut in_flight = FuturesUnordered::new();
        in_flight.push(self.ledger.submit_raw(&transaction));

        let mut rebroadcast = interval_at(
            started_at + self.rebroadcast_interval,
            self.rebroadcast_interval,
        );
        rebroadcast.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let watch = self.watcher.watch(&signature, deadline);
        tokio::pin!(watch);

        let state = loop {
            tokio::select! {
                state = &mut watch => break state,
                _ = rebroadcast.tick() => {
                    in_flight.push(self.ledger.submit_raw(&transaction));
                }
                Some(sent) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Err(e) = sent {
                        debug!("Broadcast of {} failed: {}", signature, e);
                    }
                }
            }
        };

        if !in_flight.is_empty() {
            debug!(
                "Abandoning {} pending broadcasts of {}",
                in_flight.len(),
                signature
            );
        }

        let outcome = match state {
            WatchState::Confirmed { slot, path } => {
                debug!("Transaction {} confirmed at slot {} via {:?}", signature, slot, path);
                Outcome::Confirmed { signature, slot }
            }
            WatchState::Rejected { reason, .. } => {
                warn!("Transaction {} failed: {}", signature, reason);
                Outcome::Rejected(Rejection::Network(reason))
            }
            WatchState::Expired { deadline: true } | WatchState::Pending => {
                Outcome::TimedOut(Expiry::Deadline)
            }
            WatchState::Expired { deadline: false } => Outcome::TimedOut(Expiry::PollsExhausted),
        };

        SubmissionAttempt {
            signature: Some(signature),
            started_at,
            outcome,
        }
    }
}

/// Reject a transaction the wallet handed back without every required signature
pub(crate) fn ensure_signed(transaction: Transaction) -> Result<Transaction, SignerError> {
    if !transaction.is_signed() {
        return Err(SignerError::NotEnoughSigners);
    }
    Ok(transaction)
}

/// Run `future` to completion, or until `deadline` if one is set.
/// Returns `None` when the deadline won.
pub(crate) async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}
