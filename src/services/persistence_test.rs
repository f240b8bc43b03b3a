use super::*;
use crate::state::test_helpers;
use rust_decimal_macros::dec;

// =============================================================================
// decode_text
// =============================================================================

#[test]
fn decode_text_parses_known_values() {
    assert_eq!(decode_text("tx_type", "copy_trade", TransactionType::parse).unwrap(), TransactionType::CopyTrade);
    assert_eq!(
        decode_text("status", "Awaiting Confirmation", TransactionStatus::parse).unwrap(),
        TransactionStatus::AwaitingConfirmation
    );
}

#[test]
fn decode_text_names_the_column_on_failure() {
    let err = decode_text("role", "superuser", Role::parse).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("role"), "{msg}");
    assert!(msg.contains("superuser"), "{msg}");
}

// =============================================================================
// flush_all_dirty: no database needed when nothing is dirty
// =============================================================================

#[tokio::test]
async fn flush_with_nothing_dirty_is_noop() {
    let state = test_helpers::test_app_state();
    assert_eq!(flush_all_dirty(&state).await, 0);
}

#[tokio::test]
async fn failed_flush_keeps_dirty_flags() {
    let state = test_helpers::test_app_state();
    let id = test_helpers::seed_user(&state, dec!(10)).await;

    // The test pool connects lazily to nothing, so the write fails.
    assert_eq!(flush_all_dirty(&state).await, 0);
    assert!(state.ledger.read().await.dirty.users.contains(&id));
}

#[tokio::test]
async fn snapshot_then_ack_clears_only_unchanged_records() {
    let state = test_helpers::test_app_state();
    let a = test_helpers::seed_user(&state, dec!(10)).await;
    let b = test_helpers::seed_user(&state, dec!(20)).await;

    let snapshot = state.ledger.read().await.snapshot_dirty();
    assert_eq!(snapshot.users.len(), 2);

    // b changes while the snapshot is being written.
    test_helpers::edit_user(&state, b, |u| u.balance += dec!(1)).await;
    state.ledger.write().await.ack_flushed(&snapshot);

    let ledger = state.ledger.read().await;
    assert!(!ledger.dirty.users.contains(&a));
    assert!(ledger.dirty.users.contains(&b));
}

// =============================================================================
// Live DB round trip
// =============================================================================

#[cfg(feature = "live-db-tests")]
async fn live_pool() -> PgPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL required for live-db-tests");
    crate::db::init_pool(&url).await.expect("pool")
}

#[cfg(feature = "live-db-tests")]
#[tokio::test]
async fn flush_then_hydrate_round_trips_records() {
    use crate::models::{Dispute, DisputeStatus, KycSubmission};

    let pool = live_pool().await;
    let mut user = test_helpers::dummy_user(dec!(125.50));
    user.kyc_status = KycStatus::Pending;
    user.kyc = Some(KycSubmission {
        full_name: "Round Trip".into(),
        document_type: "passport".into(),
        document_number: "X1".into(),
        submitted_at: Utc::now(),
        rejection_reason: None,
    });
    let mut tx = Transaction::new(user.id, TransactionType::Fee, dec!(-4.25), TransactionStatus::Completed, Utc::now())
        .with_description("service charge");
    tx.dispute = Some(Dispute {
        status: DisputeStatus::Open,
        reason: "wrong".into(),
        details: String::new(),
        opened_at: Utc::now(),
        resolution: None,
    });

    let snapshot = DirtySnapshot { users: vec![user.clone()], transactions: vec![tx.clone()], ..Default::default() };
    flush_snapshot(&pool, &snapshot).await.expect("flush");

    let ledger = hydrate_ledger(&pool).await.expect("hydrate");
    let loaded = ledger.user(user.id).expect("user loaded");
    assert_eq!(loaded.balance, dec!(125.50));
    assert_eq!(loaded.kyc_status, KycStatus::Pending);
    assert_eq!(loaded.kyc.as_ref().map(|k| k.full_name.as_str()), Some("Round Trip"));
    let loaded_tx = ledger.tx(tx.id).expect("tx loaded");
    assert_eq!(loaded_tx.amount, dec!(-4.25));
    assert_eq!(loaded_tx.dispute.as_ref().map(|d| d.status), Some(DisputeStatus::Open));
    assert!(ledger.dirty.is_empty());
}

#[cfg(feature = "live-db-tests")]
#[tokio::test]
async fn stale_versions_do_not_overwrite_newer_rows() {
    let pool = live_pool().await;
    let mut user = test_helpers::dummy_user(dec!(50));
    user.version = 3;
    flush_snapshot(&pool, &DirtySnapshot { users: vec![user.clone()], ..Default::default() })
        .await
        .expect("first flush");

    let mut stale = user.clone();
    stale.version = 2;
    stale.balance = dec!(1);
    flush_snapshot(&pool, &DirtySnapshot { users: vec![stale], ..Default::default() })
        .await
        .expect("stale flush");

    let ledger = hydrate_ledger(&pool).await.expect("hydrate");
    assert_eq!(ledger.user(user.id).expect("user").balance, dec!(50));
}
