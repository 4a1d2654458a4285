use crate::DispatchError;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::time::Duration;

/// Largest serialized transaction the network accepts
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Configuration for a dispatch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Maximum serialized transaction size in bytes
    pub size_ceiling: usize,

    /// Maximum number of batches in flight at once within a round
    pub max_concurrency: usize,

    /// Total number of rounds, the first one included
    pub max_rounds: usize,

    /// Deadline for a single submission attempt
    pub per_attempt_timeout_ms: u64,

    /// Interval between re-broadcasts of the same signed transaction
    pub rebroadcast_interval_ms: u64,

    /// Interval between status polls
    pub poll_interval_ms: u64,

    /// Number of status polls before an attempt is considered expired
    pub max_status_polls: usize,

    /// Number of batches that share a sequence of rounds
    pub max_batches_per_wave: usize,

    /// Optional hard deadline for the whole dispatch call
    pub dispatch_deadline_ms: Option<u64>,

    /// Time budget for fetching a fresh checkpoint at the start of a round
    pub checkpoint_retry_max_elapsed_ms: u64,

    /// Seed for the retry-order shuffle, random when unset
    pub shuffle_seed: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            size_ceiling: MAX_TRANSACTION_SIZE,
            max_concurrency: 16,
            max_rounds: 2,
            per_attempt_timeout_ms: 60_000,
            rebroadcast_interval_ms: 3_000,
            poll_interval_ms: 2_000,
            max_status_polls: 15,
            max_batches_per_wave: 200,
            dispatch_deadline_ms: None,
            checkpoint_retry_max_elapsed_ms: 10_000,
            shuffle_seed: None,
        }
    }
}

impl DispatchConfig {
    /// Parse a YAML document, filling unspecified fields with defaults
    pub fn from_yaml(source: &str) -> Result<Self, DispatchError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        let positive = [
            ("size_ceiling", self.size_ceiling as u64),
            ("max_concurrency", self.max_concurrency as u64),
            ("max_rounds", self.max_rounds as u64),
            ("per_attempt_timeout_ms", self.per_attempt_timeout_ms),
            ("rebroadcast_interval_ms", self.rebroadcast_interval_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("max_status_polls", self.max_status_polls as u64),
            ("max_batches_per_wave", self.max_batches_per_wave as u64),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(DispatchError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.dispatch_deadline_ms == Some(0) {
            return Err(DispatchError::InvalidConfig(
                "dispatch_deadline_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }

    pub fn rebroadcast_interval(&self) -> Duration {
        Duration::from_millis(self.rebroadcast_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dispatch_deadline(&self) -> Option<Duration> {
        self.dispatch_deadline_ms.map(Duration::from_millis)
    }

    /// Backoff used while fetching a checkpoint for a new round
    pub fn checkpoint_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(Duration::from_millis(
                self.checkpoint_retry_max_elapsed_ms,
            )),
            multiplier: 2.0,
            ..Default::default()
        }
    }
}

/// Settings for the Solana RPC adapter
#[derive(Debug, Clone)]
pub struct SolanaLedgerConfig {
    /// Commitment at which a polled status counts as confirmed
    pub confirmation_commitment: CommitmentConfig,

    /// Whether to skip preflight simulation on broadcast
    pub skip_preflight: bool,
}

impl Default for SolanaLedgerConfig {
    fn default() -> Self {
        Self {
            confirmation_commitment: CommitmentConfig::confirmed(),
            skip_preflight: true,
        }
    }
}
