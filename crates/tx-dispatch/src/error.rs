use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Errors that abort a whole dispatch call before any network I/O happens
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Packing failed: {0}")]
    Pack(#[from] PackError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

/// Errors raised while building logical operations or packing them into batches
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    #[error("Operation {index} does not fit in a transaction on its own: {size} bytes (max: {max})")]
    OperationTooLarge {
        index: usize,
        size: usize,
        max: usize,
    },

    #[error("Operation has no instructions")]
    EmptyOperation,

    #[error("Extra signer {pubkey} is not a signer of any instruction in its operation")]
    UnreferencedSigner { pubkey: Pubkey },
}

/// Errors reported by a ledger collaborator
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("RPC client error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),

    #[error("PubSub client error: {0}")]
    PubSub(#[from] solana_client::nonblocking::pubsub_client::PubsubClientError),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}
