use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_test::assert_ok;
use tx_dispatch::{
    packer, DispatchConfig, Expiry, Ledger, LogicalOperation, Outcome, Rejection,
    SignatureState, Submitter, WalletSigner,
};
use tx_dispatch_testing::{
    init_tracing, single_instruction_operations, LedgerBehavior, RefusingSigner,
    SimulatedLedger, SlowSigner, TEST_PROGRAM_ID,
};

fn config() -> DispatchConfig {
    DispatchConfig {
        rebroadcast_interval_ms: 1_000,
        poll_interval_ms: 10_000,
        max_status_polls: 3,
        ..Default::default()
    }
}

/// Re-broadcasting a transaction that already landed neither changes its
/// confirmed outcome nor executes it twice
#[tokio::test(start_paused = true)]
async fn test_rebroadcast_is_idempotent() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::new(LedgerBehavior {
        push_notifications: false,
        ..Default::default()
    }));
    let payer = Arc::new(Keypair::new());
    let submitter = Submitter::new(ledger.clone(), payer.clone(), &config());

    let batches = packer::pack(single_instruction_operations(3), &payer.pubkey(), 1232).unwrap();
    assert_eq!(batches.len(), 1);

    let checkpoint = ledger.latest_checkpoint().await.unwrap();
    let attempt = submitter.submit(&batches[0], checkpoint, None).await;

    let signature = attempt.signature.expect("batch was signed");
    assert!(matches!(attempt.outcome, Outcome::Confirmed { slot: 1, .. }));
    assert!(
        ledger.broadcasts_of(&signature) >= 9,
        "kept re-broadcasting until the first poll"
    );
    assert_eq!(ledger.executions(), 1);
    assert_eq!(ledger.status_of(&signature), SignatureState::Confirmed { slot: 1 });
}

/// Sending the identical signed transaction again after confirmation is a no-op
#[tokio::test(start_paused = true)]
async fn test_duplicate_submission_after_confirmation() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::default());
    let payer = Keypair::new();
    let checkpoint = ledger.latest_checkpoint().await.unwrap();
    let instruction = Instruction::new_with_bytes(
        TEST_PROGRAM_ID,
        &[9],
        vec![AccountMeta::new(Pubkey::new_unique(), false)],
    );
    let message = Message::new_with_blockhash(&[instruction], Some(&payer.pubkey()), &checkpoint);
    let tx = assert_ok!(
        payer
            .sign_transaction(Transaction::new_unsigned(message))
            .await
    );

    let first = assert_ok!(ledger.submit_raw(&tx).await);
    let second = assert_ok!(ledger.submit_raw(&tx).await);

    assert_eq!(first, second);
    assert_eq!(ledger.broadcasts_of(&first), 2);
    assert_eq!(ledger.executions(), 1);
    assert_eq!(ledger.status_of(&first), SignatureState::Confirmed { slot: 1 });
}

/// A wallet refusal is terminal and nothing reaches the network
#[tokio::test(start_paused = true)]
async fn test_signing_declined() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::default());
    let signer = Arc::new(RefusingSigner::new());
    let submitter = Submitter::new(ledger.clone(), signer.clone(), &config());

    let batches =
        packer::pack(single_instruction_operations(2), &signer.fee_payer(), 1232).unwrap();
    let checkpoint = ledger.latest_checkpoint().await.unwrap();
    let attempt = submitter.submit(&batches[0], checkpoint, None).await;

    assert!(attempt.signature.is_none());
    assert!(matches!(
        attempt.outcome,
        Outcome::Rejected(Rejection::SigningDeclined(_))
    ));
    assert_eq!(ledger.broadcasts(), 0);
}

/// Extra signers co-sign before the wallet and the ledger accepts the result
#[tokio::test(start_paused = true)]
async fn test_extra_signers_co_sign() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::default());
    let payer = Arc::new(Keypair::new());
    let authority = Arc::new(Keypair::new());
    let submitter = Submitter::new(ledger.clone(), payer.clone(), &config());

    let operation = LogicalOperation::with_signers(
        vec![Instruction::new_with_bytes(
            TEST_PROGRAM_ID,
            &[4, 2],
            vec![
                AccountMeta::new_readonly(authority.pubkey(), true),
                AccountMeta::new(Pubkey::new_unique(), false),
            ],
        )],
        vec![authority.clone()],
    )
    .unwrap();
    let mut operations = single_instruction_operations(2);
    operations.insert(1, operation);

    let batches = packer::pack(operations, &payer.pubkey(), 1232).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].extra_signers().len(), 1);

    let checkpoint = ledger.latest_checkpoint().await.unwrap();
    let attempt = submitter.submit(&batches[0], checkpoint, None).await;

    assert!(attempt.outcome.is_confirmed());
    assert_eq!(ledger.executions(), 1);
}

/// A hard deadline earlier than the attempt timeout ends the attempt
#[tokio::test(start_paused = true)]
async fn test_hard_deadline_caps_attempt() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::new(LedgerBehavior {
        drop_all_broadcasts: true,
        ..Default::default()
    }));
    let payer = Arc::new(Keypair::new());
    let submitter = Submitter::new(ledger.clone(), payer.clone(), &config());

    let batches = packer::pack(single_instruction_operations(1), &payer.pubkey(), 1232).unwrap();
    let checkpoint = ledger.latest_checkpoint().await.unwrap();
    let started = Instant::now();
    let attempt = submitter
        .submit(
            &batches[0],
            checkpoint,
            Some(started + Duration::from_millis(4_500)),
        )
        .await;

    assert_eq!(attempt.outcome, Outcome::TimedOut(Expiry::Deadline));
    assert_eq!(attempt.started_at, started);
    assert_eq!(started.elapsed(), Duration::from_millis(4_500));
    // Initial broadcast plus one per second until the deadline
    assert_eq!(ledger.broadcasts(), 5);
}

/// A node that never answers broadcasts cannot hold the attempt past its
/// timeout; the stuck sends are abandoned with the attempt
#[tokio::test(start_paused = true)]
async fn test_hung_broadcast_does_not_block_timeout() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::new(LedgerBehavior {
        broadcast_latency: Duration::from_secs(300),
        ..Default::default()
    }));
    let payer = Arc::new(Keypair::new());
    let config = DispatchConfig {
        per_attempt_timeout_ms: 10_000,
        ..config()
    };
    let submitter = Submitter::new(ledger.clone(), payer.clone(), &config);

    let batches = packer::pack(single_instruction_operations(1), &payer.pubkey(), 1232).unwrap();
    let checkpoint = ledger.latest_checkpoint().await.unwrap();
    let started = Instant::now();
    let attempt = submitter
        .submit(
            &batches[0],
            checkpoint,
            Some(started + Duration::from_secs(20)),
        )
        .await;

    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(attempt.outcome, Outcome::TimedOut(Expiry::Deadline));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(ledger.broadcasts(), 0);
    assert_eq!(ledger.executions(), 0);
}

/// The attempt window opens once the wallet has signed, so a slow approval
/// does not shorten the time left for confirmation
#[tokio::test(start_paused = true)]
async fn test_attempt_window_starts_after_signing() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::new(LedgerBehavior {
        drop_all_broadcasts: true,
        ..Default::default()
    }));
    let signer = Arc::new(SlowSigner::new(Duration::from_secs(6)));
    let config = DispatchConfig {
        per_attempt_timeout_ms: 10_000,
        max_status_polls: 100,
        ..config()
    };
    let submitter = Submitter::new(ledger.clone(), signer.clone(), &config);

    let batches =
        packer::pack(single_instruction_operations(1), &signer.fee_payer(), 1232).unwrap();
    let checkpoint = ledger.latest_checkpoint().await.unwrap();
    let requested = Instant::now();
    let attempt = submitter.submit(&batches[0], checkpoint, None).await;

    assert_eq!(attempt.started_at, requested + Duration::from_secs(6));
    assert_eq!(requested.elapsed(), Duration::from_secs(16));
    assert_eq!(attempt.outcome, Outcome::TimedOut(Expiry::Deadline));
    assert!(attempt.signature.is_some());
}

/// The hard deadline also bounds the wallet: if it passes during approval,
/// the attempt ends unsigned and nothing is sent
#[tokio::test(start_paused = true)]
async fn test_hard_deadline_bounds_signing() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::default());
    let signer = Arc::new(SlowSigner::new(Duration::from_secs(6)));
    let submitter = Submitter::new(ledger.clone(), signer.clone(), &config());

    let batches =
        packer::pack(single_instruction_operations(1), &signer.fee_payer(), 1232).unwrap();
    let checkpoint = ledger.latest_checkpoint().await.unwrap();
    let started = Instant::now();
    let attempt = submitter
        .submit(&batches[0], checkpoint, Some(started + Duration::from_secs(2)))
        .await;

    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert!(attempt.signature.is_none());
    assert_eq!(attempt.outcome, Outcome::TimedOut(Expiry::Deadline));
    assert_eq!(ledger.broadcasts(), 0);
}
