use solana_sdk::signature::{Keypair, Signer};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::time::{sleep, Instant};
use tx_dispatch::{DispatchConfig, Dispatcher, Expiry, Outcome, WalletSigner as _};
use tx_dispatch_testing::{
    ceiling_for, init_tracing, single_instruction_operations, test_config, LedgerBehavior,
    SimulatedLedger, SlowSigner,
};

/// Batches are processed in waves; each wave runs its own rounds against its
/// own checkpoint
#[tokio::test(start_paused = true)]
async fn test_batches_are_processed_in_waves() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::default());
    let payer = Arc::new(Keypair::new());
    let config = DispatchConfig {
        max_batches_per_wave: 4,
        ..test_config(ceiling_for(2, &payer.pubkey()))
    };
    let dispatcher = Dispatcher::with_config(ledger.clone(), payer.clone(), config);

    let result = dispatcher
        .dispatch(single_instruction_operations(30))
        .await
        .unwrap();

    assert_eq!(result.batches.len(), 15);
    assert_eq!(result.succeeded, 30);
    // Waves of 4, 4, 4 and 3 batches, one round each
    assert_eq!(result.rounds_run, 4);
    assert_eq!(ledger.checkpoints_issued(), 4);
    assert_eq!(ledger.executions(), 15);
}

/// Once the dispatch deadline passes no further round starts and the
/// unconfirmed batches are reported as timed out by the deadline
#[tokio::test(start_paused = true)]
async fn test_dispatch_deadline_stops_retry_rounds() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::new(LedgerBehavior {
        drop_all_broadcasts: true,
        ..Default::default()
    }));
    let payer = Arc::new(Keypair::new());
    let config = DispatchConfig {
        dispatch_deadline_ms: Some(5_000),
        max_rounds: 5,
        ..test_config(ceiling_for(10, &payer.pubkey()))
    };
    let dispatcher = Dispatcher::with_config(ledger.clone(), payer.clone(), config);

    let started = Instant::now();
    let result = dispatcher
        .dispatch(single_instruction_operations(30))
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.rounds_run, 1);
    assert_eq!(ledger.checkpoints_issued(), 1);
    for report in &result.batches {
        assert_eq!(report.attempts, 1);
        assert_eq!(report.outcome, Outcome::TimedOut(Expiry::Deadline));
    }
    assert_eq!(ledger.open_subscriptions(), 0);
}

/// No more than `max_concurrency` submissions are in flight at once
#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::new(LedgerBehavior {
        drop_all_broadcasts: true,
        ..Default::default()
    }));
    let payer = Arc::new(Keypair::new());
    let config = DispatchConfig {
        max_concurrency: 4,
        max_rounds: 1,
        ..test_config(ceiling_for(1, &payer.pubkey()))
    };
    let dispatcher = Dispatcher::with_config(ledger.clone(), payer.clone(), config);

    let (result, in_flight) = tokio::join!(
        dispatcher.dispatch(single_instruction_operations(10)),
        async {
            sleep(Duration::from_secs(1)).await;
            (ledger.open_subscriptions(), ledger.broadcasts())
        }
    );
    let result = result.unwrap();

    assert_eq!(in_flight, (4, 4));
    assert_eq!(result.batches.len(), 10);
    assert!(result
        .batches
        .iter()
        .all(|b| b.outcome == Outcome::TimedOut(Expiry::PollsExhausted)));
    assert_eq!(ledger.open_subscriptions(), 0);
}

/// A wallet still deciding when the dispatch deadline passes: nothing is
/// broadcast and the call returns at the deadline
#[tokio::test(start_paused = true)]
async fn test_deadline_during_wallet_approval_sends_nothing() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::new(LedgerBehavior {
        push_notifications: false,
        ..Default::default()
    }));
    let signer = Arc::new(SlowSigner::new(Duration::from_secs(6)));
    let config = DispatchConfig {
        dispatch_deadline_ms: Some(5_000),
        max_concurrency: 1,
        ..test_config(ceiling_for(10, &signer.fee_payer()))
    };
    let dispatcher = Dispatcher::with_config(ledger.clone(), signer, config);

    let started = Instant::now();
    let result = dispatcher
        .dispatch(single_instruction_operations(30))
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.rounds_run, 1);
    assert_eq!(ledger.broadcasts(), 0);
    for report in &result.batches {
        assert_eq!(report.outcome, Outcome::TimedOut(Expiry::Deadline));
        assert!(report.last_signature.is_none());
    }

    sleep(Duration::from_secs(60)).await;
    assert_eq!(ledger.executions(), 0);
}

/// Batches still queued behind the concurrency limit when the deadline
/// passes are never broadcast
#[tokio::test(start_paused = true)]
async fn test_queued_batches_do_not_start_after_deadline() {
    init_tracing();
    let ledger = Arc::new(SimulatedLedger::new(LedgerBehavior {
        drop_all_broadcasts: true,
        ..Default::default()
    }));
    let payer = Arc::new(Keypair::new());
    let config = DispatchConfig {
        dispatch_deadline_ms: Some(5_000),
        max_concurrency: 1,
        ..test_config(ceiling_for(10, &payer.pubkey()))
    };
    let dispatcher = Dispatcher::with_config(ledger.clone(), payer.clone(), config);

    let started = Instant::now();
    let result = dispatcher
        .dispatch(single_instruction_operations(30))
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(5));
    let sent: HashSet<_> = ledger
        .broadcast_log()
        .iter()
        .map(|tx| tx.signatures[0])
        .collect();
    assert_eq!(sent.len(), 1, "only the first batch went out");

    assert_eq!(result.batches[0].attempts, 1);
    for report in &result.batches[1..] {
        assert_eq!(report.attempts, 0);
    }
    assert!(result
        .batches
        .iter()
        .all(|b| b.outcome == Outcome::TimedOut(Expiry::Deadline)));
}
