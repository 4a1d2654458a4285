use async_trait::async_trait;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::sync::oneshot;
use tracing::debug;
use tx_dispatch::{
    ConfirmationNotice, ConfirmationSubscription, Ledger, LedgerError, SignatureState,
};

/// Reason reported for transactions that touch a failing account
pub const SIMULATED_FAILURE: &str = "InstructionError(0, Custom(1))";

/// Fault injection knobs for [`SimulatedLedger`]
#[derive(Debug, Clone)]
pub struct LedgerBehavior {
    /// Silently drop the first broadcast of every signature
    pub drop_first_broadcast: bool,
    /// Silently drop every broadcast, so nothing ever lands
    pub drop_all_broadcasts: bool,
    /// Drop every broadcast of transactions built on the first N checkpoints handed out
    pub lossy_checkpoints: usize,
    /// Transactions referencing any of these accounts fail when executed
    pub failing_accounts: HashSet<Pubkey>,
    /// Deliver push notifications to subscribers
    pub push_notifications: bool,
    /// Answer status queries; when false every query reports pending
    pub status_queries: bool,
    /// Fail this many checkpoint requests before serving any
    pub checkpoint_failures: usize,
    /// Time between accepting a broadcast and the transaction landing
    pub landing_delay: Duration,
    /// Time every broadcast call takes before the node answers
    pub broadcast_latency: Duration,
}

impl Default for LedgerBehavior {
    fn default() -> Self {
        Self {
            drop_first_broadcast: false,
            drop_all_broadcasts: false,
            lossy_checkpoints: 0,
            failing_accounts: HashSet::new(),
            push_notifications: true,
            status_queries: true,
            checkpoint_failures: 0,
            landing_delay: Duration::ZERO,
            broadcast_latency: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct LedgerState {
    slot: u64,
    checkpoints: Vec<Hash>,
    checkpoint_requests: usize,
    broadcasts: HashMap<Signature, usize>,
    broadcast_log: Vec<Transaction>,
    dropped_broadcasts: usize,
    in_flight: HashSet<Signature>,
    landed: HashMap<Signature, SignatureState>,
    executions: usize,
    status_polls: usize,
    subscribers: HashMap<Signature, Vec<oneshot::Sender<ConfirmationNotice>>>,
    subscriptions: usize,
}

impl LedgerState {
    fn land(&mut self, signature: Signature, failure: Option<String>, push: bool) {
        self.in_flight.remove(&signature);
        self.slot += 1;
        self.executions += 1;

        let (state, notice) = match failure {
            Some(reason) => (
                SignatureState::Rejected {
                    reason: reason.clone(),
                },
                ConfirmationNotice::Rejected { reason },
            ),
            None => (
                SignatureState::Confirmed { slot: self.slot },
                ConfirmationNotice::Confirmed { slot: self.slot },
            ),
        };
        self.landed.insert(signature, state);
        debug!("Simulated ledger landed {} at slot {}", signature, self.slot);

        if push {
            for sender in self.subscribers.remove(&signature).unwrap_or_default() {
                let _ = sender.send(notice.clone());
            }
        }
    }
}

/// In-memory ledger that executes each signature at most once and lets tests
/// inject broadcast loss, execution failures and channel outages
pub struct SimulatedLedger {
    state: Arc<Mutex<LedgerState>>,
    behavior: LedgerBehavior,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new(LedgerBehavior::default())
    }
}

impl SimulatedLedger {
    pub fn new(behavior: LedgerBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            behavior,
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().expect("simulated ledger state poisoned")
    }

    fn execution_failure(&self, transaction: &Transaction) -> Option<String> {
        transaction
            .message
            .account_keys
            .iter()
            .any(|key| self.behavior.failing_accounts.contains(key))
            .then(|| SIMULATED_FAILURE.to_string())
    }

    /// Total broadcasts received, dropped ones included
    pub fn broadcasts(&self) -> usize {
        self.state().broadcasts.values().sum()
    }

    /// Every transaction received, in arrival order, dropped ones included
    pub fn broadcast_log(&self) -> Vec<Transaction> {
        self.state().broadcast_log.clone()
    }

    pub fn broadcasts_of(&self, signature: &Signature) -> usize {
        self.state().broadcasts.get(signature).copied().unwrap_or(0)
    }

    pub fn dropped_broadcasts(&self) -> usize {
        self.state().dropped_broadcasts
    }

    /// Number of transactions executed; duplicates of a landed signature are not re-executed
    pub fn executions(&self) -> usize {
        self.state().executions
    }

    pub fn status_polls(&self) -> usize {
        self.state().status_polls
    }

    /// Checkpoint requests received, failed ones included
    pub fn checkpoint_requests(&self) -> usize {
        self.state().checkpoint_requests
    }

    pub fn checkpoints_issued(&self) -> usize {
        self.state().checkpoints.len()
    }

    pub fn subscriptions(&self) -> usize {
        self.state().subscriptions
    }

    /// Subscriptions whose subscriber is still listening
    pub fn open_subscriptions(&self) -> usize {
        self.state()
            .subscribers
            .values()
            .flatten()
            .filter(|sender| !sender.is_closed())
            .count()
    }

    pub fn status_of(&self, signature: &Signature) -> SignatureState {
        self.state()
            .landed
            .get(signature)
            .cloned()
            .unwrap_or(SignatureState::Pending)
    }

    /// Land a transaction directly, as if another node had forwarded it
    pub fn force_land(&self, transaction: &Transaction) {
        let failure = self.execution_failure(transaction);
        let mut state = self.state();
        if !state.landed.contains_key(&transaction.signatures[0]) {
            state.land(
                transaction.signatures[0],
                failure,
                self.behavior.push_notifications,
            );
        }
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn latest_checkpoint(&self) -> Result<Hash, LedgerError> {
        let mut state = self.state();
        state.checkpoint_requests += 1;
        if state.checkpoint_requests <= self.behavior.checkpoint_failures {
            return Err(LedgerError::Unavailable(
                "checkpoint request failed".to_string(),
            ));
        }

        let checkpoint = Hash::new_unique();
        state.checkpoints.push(checkpoint);
        Ok(checkpoint)
    }

    async fn submit_raw(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        if !self.behavior.broadcast_latency.is_zero() {
            tokio::time::sleep(self.behavior.broadcast_latency).await;
        }

        transaction
            .verify()
            .map_err(|e| LedgerError::Unavailable(format!("invalid transaction: {e}")))?;

        let signature = transaction.signatures[0];
        let blockhash = transaction.message.recent_blockhash;
        let failure = self.execution_failure(transaction);

        let mut state = self.state();
        let position = state
            .checkpoints
            .iter()
            .position(|checkpoint| *checkpoint == blockhash)
            .ok_or_else(|| LedgerError::Unavailable("blockhash not found".to_string()))?;

        state.broadcast_log.push(transaction.clone());
        let seen = state.broadcasts.entry(signature).or_insert(0);
        *seen += 1;
        let nth = *seen;

        let dropped = self.behavior.drop_all_broadcasts
            || position < self.behavior.lossy_checkpoints
            || (self.behavior.drop_first_broadcast && nth == 1);
        if dropped {
            state.dropped_broadcasts += 1;
            return Ok(signature);
        }

        if state.landed.contains_key(&signature) || state.in_flight.contains(&signature) {
            return Ok(signature);
        }

        let push = self.behavior.push_notifications;
        if self.behavior.landing_delay.is_zero() {
            state.land(signature, failure, push);
        } else {
            state.in_flight.insert(signature);
            let shared = Arc::clone(&self.state);
            let delay = self.behavior.landing_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Ok(mut state) = shared.lock() {
                    state.land(signature, failure, push);
                }
            });
        }

        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, LedgerError> {
        let mut state = self.state();
        state.status_polls += 1;
        if !self.behavior.status_queries {
            return Ok(SignatureState::Pending);
        }
        Ok(state
            .landed
            .get(signature)
            .cloned()
            .unwrap_or(SignatureState::Pending))
    }

    async fn subscribe_confirmation(
        &self,
        signature: &Signature,
    ) -> Result<ConfirmationSubscription, LedgerError> {
        let (sender, subscription) = ConfirmationSubscription::channel();
        let mut state = self.state();
        state.subscriptions += 1;

        let landed = state.landed.get(signature).cloned();
        match landed {
            Some(SignatureState::Confirmed { slot }) if self.behavior.push_notifications => {
                let _ = sender.send(ConfirmationNotice::Confirmed { slot });
            }
            Some(SignatureState::Rejected { reason }) if self.behavior.push_notifications => {
                let _ = sender.send(ConfirmationNotice::Rejected { reason });
            }
            _ => state.subscribers.entry(*signature).or_default().push(sender),
        }

        Ok(subscription)
    }
}
