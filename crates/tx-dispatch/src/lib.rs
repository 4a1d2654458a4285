/*!
# Transaction Dispatch

Delivers large numbers of logical operations to a Solana-style ledger. Operations
are packed greedily into as few size-bounded transactions as possible, submitted
concurrently with periodic re-broadcasting, and confirmed through whichever of a
push subscription or status polling answers first. Batches that time out are
re-signed against a fresh blockhash and retried for a bounded number of rounds.
Every operation gets a success flag in the final report.

## Quick Start

```rust,no_run
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{instruction::Instruction, signature::Keypair};
use std::sync::Arc;
use tx_dispatch::{Dispatcher, LogicalOperation, SolanaLedger};

# async fn example() -> Result<(), Box<dyn std::error::Error>> {
let rpc_client = Arc::new(RpcClient::new("https://api.devnet.solana.com".to_string()));
let ledger = Arc::new(SolanaLedger::new(rpc_client));
let dispatcher = Dispatcher::new(ledger, Arc::new(Keypair::new()));

let instructions: Vec<Instruction> = vec![/* your instructions */];
let operations = instructions
    .into_iter()
    .map(|ix| LogicalOperation::new(vec![ix]))
    .collect::<Result<Vec<_>, _>>()?;

let result = dispatcher.dispatch(operations).await?;
println!("{} of {} operations landed", result.succeeded, result.total);
# Ok(())
# }
```

## Custom Configuration

```rust,no_run
# use solana_client::nonblocking::rpc_client::RpcClient;
# use solana_sdk::signature::Keypair;
# use std::sync::Arc;
# use tx_dispatch::{Dispatcher, DispatchConfig, SolanaLedger};
# async fn example() -> Result<(), Box<dyn std::error::Error>> {
let ledger = Arc::new(
    SolanaLedger::connect(
        "https://api.devnet.solana.com".to_string(),
        "wss://api.devnet.solana.com",
    )
    .await?,
);
let config = DispatchConfig {
    max_concurrency: 32,
    max_rounds: 3,
    ..Default::default()
};
let dispatcher = Dispatcher::with_config(ledger, Arc::new(Keypair::new()), config);
# Ok(())
# }
```
*/

mod config;
mod dispatcher;
mod error;
mod ledger;
mod operation;
mod outcome;
mod submitter;
mod watcher;

pub mod packer;
pub mod solana;

pub use config::{DispatchConfig, SolanaLedgerConfig, MAX_TRANSACTION_SIZE};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, LedgerError, PackError};
pub use ledger::{
    ConfirmationNotice, ConfirmationSubscription, Ledger, SignatureState, WalletSigner,
};
pub use operation::{Batch, LogicalOperation};
pub use outcome::{BatchReport, DispatchResult, Expiry, Outcome, Rejection, SubmissionAttempt};
pub use solana::SolanaLedger;
pub use submitter::Submitter;
pub use watcher::{ConfirmationWatcher, DetectionPath, WatchState};

// Re-export key Solana types for convenience
pub use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::Transaction,
};
