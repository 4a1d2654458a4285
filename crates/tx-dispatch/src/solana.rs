/*!
Ledger implementation backed by a Solana RPC node and, optionally, its
websocket PubSub endpoint.
*/

use crate::{
    ConfirmationNotice, ConfirmationSubscription, Ledger, LedgerError, SignatureState,
    SolanaLedgerConfig,
};
use async_trait::async_trait;
use futures::StreamExt;
use solana_client::{
    nonblocking::{pubsub_client::PubsubClient, rpc_client::RpcClient},
    rpc_config::{RpcSendTransactionConfig, RpcSignatureSubscribeConfig},
    rpc_response::{Response, RpcSignatureResult},
};
use solana_sdk::{
    hash::Hash,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SolanaLedger {
    rpc_client: Arc<RpcClient>,
    pubsub_client: Option<Arc<PubsubClient>>,
    config: SolanaLedgerConfig,
}

impl SolanaLedger {
    /// Pull-only ledger: confirmations are detected by status polling alone
    pub fn new(rpc_client: Arc<RpcClient>) -> Self {
        Self {
            rpc_client,
            pubsub_client: None,
            config: SolanaLedgerConfig::default(),
        }
    }

    /// Connect to both the RPC and the PubSub endpoint
    pub async fn connect(rpc_url: String, ws_url: &str) -> Result<Self, LedgerError> {
        let config = SolanaLedgerConfig::default();
        let rpc_client = RpcClient::new_with_commitment(rpc_url, config.confirmation_commitment);
        let pubsub_client = PubsubClient::new(ws_url).await?;

        Ok(Self {
            rpc_client: Arc::new(rpc_client),
            pubsub_client: Some(Arc::new(pubsub_client)),
            config,
        })
    }

    pub fn with_pubsub(mut self, pubsub_client: Arc<PubsubClient>) -> Self {
        self.pubsub_client = Some(pubsub_client);
        self
    }

    pub fn with_config(mut self, config: SolanaLedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rpc_client(&self) -> &Arc<RpcClient> {
        &self.rpc_client
    }
}

#[async_trait]
impl Ledger for SolanaLedger {
    async fn latest_checkpoint(&self) -> Result<Hash, LedgerError> {
        Ok(self.rpc_client.get_latest_blockhash().await?)
    }

    async fn submit_raw(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: self.config.skip_preflight,
            preflight_commitment: Some(self.config.confirmation_commitment.commitment),
            ..Default::default()
        };
        Ok(self
            .rpc_client
            .send_transaction_with_config(transaction, config)
            .await?)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, LedgerError> {
        let response = self.rpc_client.get_signature_statuses(&[*signature]).await?;

        let state = match response.value.into_iter().next().flatten() {
            None => SignatureState::Pending,
            Some(status) => state_from_status(
                status.slot,
                status.err.as_ref(),
                status.satisfies_commitment(self.config.confirmation_commitment),
            ),
        };

        Ok(state)
    }

    async fn subscribe_confirmation(
        &self,
        signature: &Signature,
    ) -> Result<ConfirmationSubscription, LedgerError> {
        let Some(pubsub_client) = &self.pubsub_client else {
            return Ok(ConfirmationSubscription::never());
        };

        let (mut sender, subscription) = ConfirmationSubscription::channel();
        let pubsub_client = Arc::clone(pubsub_client);
        let signature = *signature;
        let config = RpcSignatureSubscribeConfig {
            commitment: Some(self.config.confirmation_commitment),
            enable_received_notification: Some(false),
        };

        // The notification stream borrows the client, so the whole
        // subscription lives inside this task
        tokio::spawn(async move {
            let (mut notifications, unsubscribe) = match pubsub_client
                .signature_subscribe(&signature, Some(config))
                .await
            {
                Ok(subscribed) => subscribed,
                Err(e) => {
                    warn!("Failed to subscribe to signature {}: {}", signature, e);
                    return;
                }
            };

            let notice = loop {
                tokio::select! {
                    next = notifications.next() => match next {
                        Some(response) => {
                            if let Some(notice) = notice_from_response(response) {
                                break Some(notice);
                            }
                        }
                        None => break None,
                    },
                    _ = sender.closed() => break None,
                }
            };

            if let Some(notice) = notice {
                debug!("Push notification for {}: {:?}", signature, notice);
                let _ = sender.send(notice);
            }

            drop(notifications);
            unsubscribe().await;
        });

        Ok(subscription)
    }
}

/// A failed execution is final at any commitment; success only counts once
/// the configured commitment is reached
fn state_from_status(
    slot: u64,
    err: Option<&TransactionError>,
    at_commitment: bool,
) -> SignatureState {
    match err {
        Some(err) => SignatureState::Rejected {
            reason: format!("{err:?}"),
        },
        None if at_commitment => SignatureState::Confirmed { slot },
        None => SignatureState::Pending,
    }
}

fn notice_from_response(response: Response<RpcSignatureResult>) -> Option<ConfirmationNotice> {
    match response.value {
        RpcSignatureResult::ProcessedSignature(result) => Some(match result.err {
            Some(err) => ConfirmationNotice::Rejected {
                reason: format!("{err:?}"),
            },
            None => ConfirmationNotice::Confirmed {
                slot: response.context.slot,
            },
        }),
        RpcSignatureResult::ReceivedSignature(_) => None,
    }
}
