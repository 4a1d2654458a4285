/*!
Greedy size-bounded packing of logical operations into batches.

Operations are scanned once, in order. Each one is appended to the open batch
if the trial-compiled transaction still fits under the ceiling; otherwise the
open batch is closed and a new one starts with the operation that did not fit.
The result is order preserving and never splits an operation, but it is not a
minimal bin packing.
*/

use crate::{Batch, LogicalOperation, PackError};
use solana_sdk::{
    instruction::Instruction, message::Message, pubkey::Pubkey, signature::SIGNATURE_BYTES,
};
use std::mem;
use tracing::debug;

/// Pack `operations` into batches whose signed transactions fit in `size_ceiling` bytes
pub fn pack(
    operations: Vec<LogicalOperation>,
    fee_payer: &Pubkey,
    size_ceiling: usize,
) -> Result<Vec<Batch>, PackError> {
    let total = operations.len();
    let mut batches = Vec::new();

    let mut open: Vec<LogicalOperation> = Vec::new();
    let mut open_instructions: Vec<Instruction> = Vec::new();
    let mut open_size = 0;
    let mut open_first = 0;

    for (index, operation) in operations.into_iter().enumerate() {
        if !open.is_empty() {
            let mut trial = open_instructions.clone();
            trial.extend(operation.instructions().iter().cloned());
            let trial_size = transaction_size(&trial, fee_payer);

            if trial_size <= size_ceiling {
                open_instructions = trial;
                open_size = trial_size;
                open.push(operation);
                continue;
            }

            batches.push(Batch::new(mem::take(&mut open), open_first, open_size));
        }

        // A subset of a batch never compiles larger than the batch, so only
        // operations that open a batch need the standalone check.
        let alone = transaction_size(operation.instructions(), fee_payer);
        if alone > size_ceiling {
            return Err(PackError::OperationTooLarge {
                index,
                size: alone,
                max: size_ceiling,
            });
        }

        open_instructions = operation.instructions().to_vec();
        open_size = alone;
        open_first = index;
        open.push(operation);
    }

    if !open.is_empty() {
        batches.push(Batch::new(open, open_first, open_size));
    }

    debug!(
        "Packed {} operations into {} batches (ceiling {} bytes)",
        total,
        batches.len(),
        size_ceiling
    );

    Ok(batches)
}

/// Serialized size of a legacy transaction carrying `instructions`, paid and signed by `fee_payer`
pub fn transaction_size(instructions: &[Instruction], fee_payer: &Pubkey) -> usize {
    let message = Message::new(instructions, Some(fee_payer));
    let signatures = usize::from(message.header.num_required_signatures);
    short_vec_len(signatures) + signatures * SIGNATURE_BYTES + message.serialize().len()
}

/// Length of the compact-u16 prefix used for wire arrays
fn short_vec_len(len: usize) -> usize {
    match len {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        _ => 3,
    }
}
