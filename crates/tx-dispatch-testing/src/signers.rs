use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    signer::SignerError,
    transaction::Transaction,
};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tx_dispatch::WalletSigner;

/// Wallet whose user declines every signature request
pub struct RefusingSigner {
    fee_payer: Pubkey,
}

impl RefusingSigner {
    pub fn new() -> Self {
        Self {
            fee_payer: Keypair::new().pubkey(),
        }
    }
}

impl Default for RefusingSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSigner for RefusingSigner {
    fn fee_payer(&self) -> Pubkey {
        self.fee_payer
    }

    async fn sign_transaction(&self, _transaction: Transaction) -> Result<Transaction, SignerError> {
        Err(SignerError::UserCancel("user rejected the request".to_string()))
    }
}

/// Keypair-backed wallet that counts signature requests and the
/// transactions they carried
pub struct CountingSigner {
    keypair: Keypair,
    requests: AtomicUsize,
    transactions: AtomicUsize,
}

impl CountingSigner {
    pub fn new() -> Self {
        Self {
            keypair: Keypair::new(),
            requests: AtomicUsize::new(0),
            transactions: AtomicUsize::new(0),
        }
    }

    /// Number of times the wallet was asked to sign, bulk requests counting once
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn signed_transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }
}

impl Default for CountingSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSigner for CountingSigner {
    fn fee_payer(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, SignerError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.transactions.fetch_add(1, Ordering::SeqCst);
        self.keypair.sign_transaction(transaction).await
    }

    async fn sign_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, SignerError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.transactions
            .fetch_add(transactions.len(), Ordering::SeqCst);
        let mut signed = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            signed.push(self.keypair.sign_transaction(transaction).await?);
        }
        Ok(signed)
    }
}

/// Keypair-backed wallet that takes `delay` to approve each transaction,
/// like a user confirming prompts one by one
pub struct SlowSigner {
    keypair: Keypair,
    delay: Duration,
}

impl SlowSigner {
    pub fn new(delay: Duration) -> Self {
        Self {
            keypair: Keypair::new(),
            delay,
        }
    }
}

#[async_trait]
impl WalletSigner for SlowSigner {
    fn fee_payer(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, SignerError> {
        tokio::time::sleep(self.delay).await;
        self.keypair.sign_transaction(transaction).await
    }
}
