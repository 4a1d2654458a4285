/*!
Collaborator contracts consumed by the dispatcher: the ledger node and the
wallet that signs on behalf of the fee payer.
*/

use crate::LedgerError;
use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    signer::SignerError,
    transaction::Transaction,
};
use tokio::sync::oneshot;

/// Status of a transaction as seen through a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Unknown to the node or not yet at the required commitment
    Pending,
    Confirmed { slot: u64 },
    Rejected { reason: String },
}

/// A one-shot confirmation pushed by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationNotice {
    Confirmed { slot: u64 },
    Rejected { reason: String },
}

/// Registration for a single push notification.
///
/// Dropping the subscription unsubscribes. A feed that dies before delivering
/// anything leaves the subscription pending forever.
#[derive(Debug)]
pub struct ConfirmationSubscription {
    receiver: Option<oneshot::Receiver<ConfirmationNotice>>,
}

impl ConfirmationSubscription {
    /// Create a subscription and the sender the ledger side delivers through
    pub fn channel() -> (oneshot::Sender<ConfirmationNotice>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                receiver: Some(receiver),
            },
        )
    }

    /// A subscription that never fires, for ledgers without a push channel
    pub fn never() -> Self {
        Self { receiver: None }
    }

    /// Wait for the notification. Pends forever if the feed went away.
    pub async fn recv(self) -> ConfirmationNotice {
        if let Some(receiver) = self.receiver {
            if let Ok(notice) = receiver.await {
                return notice;
            }
        }
        std::future::pending().await
    }
}

/// Remote ledger node
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch a fresh checkpoint (recent blockhash) to build transactions against
    async fn latest_checkpoint(&self) -> Result<Hash, LedgerError>;

    /// Broadcast a signed transaction. Acceptance does not imply landing.
    async fn submit_raw(&self, transaction: &Transaction) -> Result<Signature, LedgerError>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, LedgerError>;

    /// Register for a one-shot confirmation notification
    async fn subscribe_confirmation(
        &self,
        signature: &Signature,
    ) -> Result<ConfirmationSubscription, LedgerError>;
}

/// Signs transactions as the fee payer. May be interactive and may refuse.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Public key of the fee payer this wallet signs for
    fn fee_payer(&self) -> Pubkey;

    /// Add the fee payer's signature, keeping any signatures already present
    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, SignerError>;

    /// Sign a whole round in one request. A refusal applies to every transaction.
    ///
    /// Interactive wallets should override this so the user approves the
    /// round once instead of once per transaction.
    async fn sign_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, SignerError> {
        let mut signed = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            signed.push(self.sign_transaction(transaction).await?);
        }
        Ok(signed)
    }
}

#[async_trait]
impl WalletSigner for Keypair {
    fn fee_payer(&self) -> Pubkey {
        self.pubkey()
    }

    async fn sign_transaction(
        &self,
        mut transaction: Transaction,
    ) -> Result<Transaction, SignerError> {
        let blockhash = transaction.message.recent_blockhash;
        transaction.try_partial_sign(&[self], blockhash)?;
        Ok(transaction)
    }
}
