use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::sync::Once;
use tracing_subscriber::EnvFilter;
use tx_dispatch::{packer::transaction_size, DispatchConfig, LogicalOperation};

/// Program id used by every fixture instruction
pub const TEST_PROGRAM_ID: Pubkey = Pubkey::new_from_array([7; 32]);

/// Instruction data length of fixture instructions
pub const TEST_DATA_LEN: usize = 8;

/// A one-instruction operation writing to a fresh account.
///
/// All fixture operations have the same shape, so a batch of N of them
/// always compiles to the same size.
pub fn single_instruction_operation(tag: u64) -> LogicalOperation {
    let instruction = Instruction::new_with_bytes(
        TEST_PROGRAM_ID,
        &tag.to_le_bytes()[..TEST_DATA_LEN],
        vec![AccountMeta::new(Pubkey::new_unique(), false)],
    );
    LogicalOperation::new(vec![instruction]).expect("fixture operation has an instruction")
}

pub fn single_instruction_operations(count: usize) -> Vec<LogicalOperation> {
    (0..count as u64).map(single_instruction_operation).collect()
}

/// The writable account of a fixture operation, used to mark it as failing
pub fn operation_account(operation: &LogicalOperation) -> Pubkey {
    operation.instructions()[0].accounts[0].pubkey
}

/// Size ceiling that fits exactly `per_batch` fixture operations per transaction
pub fn ceiling_for(per_batch: usize, fee_payer: &Pubkey) -> usize {
    let instructions: Vec<Instruction> = single_instruction_operations(per_batch)
        .iter()
        .flat_map(|op| op.instructions().to_vec())
        .collect();
    transaction_size(&instructions, fee_payer)
}

/// Default configuration with a fixed shuffle seed and the given ceiling
pub fn test_config(size_ceiling: usize) -> DispatchConfig {
    DispatchConfig {
        size_ceiling,
        shuffle_seed: Some(7),
        ..Default::default()
    }
}

/// Install a tracing subscriber honoring RUST_LOG, once per test binary
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}
