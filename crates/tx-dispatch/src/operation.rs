use crate::PackError;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::{fmt, ops::Range, sync::Arc};

/// The smallest caller-meaningful unit of work: an ordered list of instructions
/// that must land together, plus the extra keypairs that have to co-sign them.
#[derive(Clone)]
pub struct LogicalOperation {
    instructions: Vec<Instruction>,
    signers: Vec<Arc<Keypair>>,
}

impl LogicalOperation {
    /// An operation signed only by the primary signer
    pub fn new(instructions: Vec<Instruction>) -> Result<Self, PackError> {
        Self::with_signers(instructions, Vec::new())
    }

    /// An operation that also needs signatures from `signers`.
    ///
    /// Every extra signer must appear as a signer account in at least one of
    /// the instructions, otherwise the resulting transaction could never be
    /// fully signed.
    pub fn with_signers(
        instructions: Vec<Instruction>,
        signers: Vec<Arc<Keypair>>,
    ) -> Result<Self, PackError> {
        if instructions.is_empty() {
            return Err(PackError::EmptyOperation);
        }

        for signer in &signers {
            let pubkey = signer.pubkey();
            let referenced = instructions.iter().any(|ix| {
                ix.accounts
                    .iter()
                    .any(|meta| meta.is_signer && meta.pubkey == pubkey)
            });
            if !referenced {
                return Err(PackError::UnreferencedSigner { pubkey });
            }
        }

        Ok(Self {
            instructions,
            signers,
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn signers(&self) -> &[Arc<Keypair>] {
        &self.signers
    }
}

impl fmt::Debug for LogicalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signers: Vec<Pubkey> = self.signers.iter().map(|s| s.pubkey()).collect();
        f.debug_struct("LogicalOperation")
            .field("instructions", &self.instructions)
            .field("signers", &signers)
            .finish()
    }
}

/// A contiguous run of logical operations that is sent as one transaction
#[derive(Debug, Clone)]
pub struct Batch {
    operations: Vec<LogicalOperation>,
    first_operation: usize,
    serialized_size: usize,
}

impl Batch {
    pub(crate) fn new(
        operations: Vec<LogicalOperation>,
        first_operation: usize,
        serialized_size: usize,
    ) -> Self {
        Self {
            operations,
            first_operation,
            serialized_size,
        }
    }

    pub fn operations(&self) -> &[LogicalOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Indices of this batch's operations in the caller's original list
    pub fn operation_range(&self) -> Range<usize> {
        self.first_operation..self.first_operation + self.operations.len()
    }

    /// Size in bytes of the signed transaction this batch compiles to
    pub fn serialized_size(&self) -> usize {
        self.serialized_size
    }

    /// All instructions in packing order
    pub fn instructions(&self) -> Vec<Instruction> {
        self.operations
            .iter()
            .flat_map(|op| op.instructions().iter().cloned())
            .collect()
    }

    /// Extra co-signers, deduplicated by public key
    pub fn extra_signers(&self) -> Vec<Arc<Keypair>> {
        let mut signers: Vec<Arc<Keypair>> = Vec::new();
        for signer in self.operations.iter().flat_map(|op| op.signers()) {
            if !signers.iter().any(|s| s.pubkey() == signer.pubkey()) {
                signers.push(Arc::clone(signer));
            }
        }
        signers
    }
}
