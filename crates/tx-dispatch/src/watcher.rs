/*!
Confirmation detection for a single transaction.

Two detection paths race: a push subscription that fires once when the ledger
processes the transaction, and a pull loop that queries the status on a fixed
cadence with a bounded budget. The first path to reach a terminal state wins
and the other is dropped, which releases its subscription or timer. An
overall deadline bounds the race.
*/

use crate::{ConfirmationNotice, Ledger, SignatureState};
use solana_sdk::signature::Signature;
use std::{future, sync::Arc, time::Duration};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionPath {
    Push,
    Pull,
}

/// Confirmation state of one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Pending,
    Confirmed { slot: u64, path: DetectionPath },
    Rejected { reason: String, path: DetectionPath },
    /// No terminal status observed; `deadline` is set when the overall
    /// deadline fired rather than the poll budget running out
    Expired { deadline: bool },
}

impl WatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatchState::Pending)
    }

    /// Move to a terminal state. Only the first transition takes effect;
    /// returns whether this call was it.
    pub fn settle(&mut self, next: WatchState) -> bool {
        if self.is_terminal() || !next.is_terminal() {
            return false;
        }
        *self = next;
        true
    }
}

pub struct ConfirmationWatcher<L: ?Sized> {
    ledger: Arc<L>,
    poll_interval: Duration,
    max_polls: usize,
}

impl<L: Ledger + ?Sized> ConfirmationWatcher<L> {
    pub fn new(ledger: Arc<L>, poll_interval: Duration, max_polls: usize) -> Self {
        Self {
            ledger,
            poll_interval,
            max_polls,
        }
    }

    /// Watch `signature` until either path resolves or `deadline` passes
    pub async fn watch(&self, signature: &Signature, deadline: Instant) -> WatchState {
        let mut state = WatchState::Pending;

        let resolved = tokio::select! {
            resolved = self.push_path(signature) => resolved,
            resolved = self.pull_path(signature) => resolved,
            _ = sleep_until(deadline) => WatchState::Expired { deadline: true },
        };
        state.settle(resolved);

        debug!("Transaction {} resolved: {:?}", signature, state);
        state
    }

    async fn push_path(&self, signature: &Signature) -> WatchState {
        let subscription = match self.ledger.subscribe_confirmation(signature).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Confirmation subscription for {} failed: {}", signature, e);
                return future::pending().await;
            }
        };

        match subscription.recv().await {
            ConfirmationNotice::Confirmed { slot } => WatchState::Confirmed {
                slot,
                path: DetectionPath::Push,
            },
            ConfirmationNotice::Rejected { reason } => WatchState::Rejected {
                reason,
                path: DetectionPath::Push,
            },
        }
    }

    async fn pull_path(&self, signature: &Signature) -> WatchState {
        for attempt in 1..=self.max_polls {
            sleep(self.poll_interval).await;

            match self.ledger.signature_status(signature).await {
                Ok(SignatureState::Pending) => {
                    debug!(
                        "Transaction {} still pending after poll {}/{}",
                        signature, attempt, self.max_polls
                    );
                }
                Ok(SignatureState::Confirmed { slot }) => {
                    return WatchState::Confirmed {
                        slot,
                        path: DetectionPath::Pull,
                    };
                }
                Ok(SignatureState::Rejected { reason }) => {
                    return WatchState::Rejected {
                        reason,
                        path: DetectionPath::Pull,
                    };
                }
                Err(e) => {
                    warn!("Status query {} for {} failed: {}", attempt, signature, e);
                }
            }
        }

        WatchState::Expired { deadline: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_transition_wins() {
        let mut state = WatchState::Pending;

        assert!(state.settle(WatchState::Confirmed {
            slot: 9,
            path: DetectionPath::Push,
        }));
        assert!(!state.settle(WatchState::Rejected {
            reason: "late".into(),
            path: DetectionPath::Pull,
        }));
        assert!(!state.settle(WatchState::Expired { deadline: true }));

        assert_eq!(
            state,
            WatchState::Confirmed {
                slot: 9,
                path: DetectionPath::Push,
            }
        );
    }

    #[test]
    fn test_pending_is_not_a_transition() {
        let mut state = WatchState::Pending;
        assert!(!state.settle(WatchState::Pending));
        assert!(!state.is_terminal());
    }
}
