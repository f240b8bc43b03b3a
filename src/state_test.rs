use super::*;
use crate::models::TransactionStatus;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

fn tx_for(user_id: Uuid, tx_type: TransactionType, status: TransactionStatus) -> Transaction {
    Transaction::new(user_id, tx_type, dec!(10), status, Utc::now())
}

#[test]
fn insert_user_indexes_email_and_referral() {
    let mut ledger = Ledger::new();
    let user = test_helpers::dummy_user(dec!(5));
    let (id, email, code) = (user.id, user.email.clone(), user.referral_code.clone());
    ledger.insert_user(user);

    assert_eq!(ledger.user_id_by_email(&email), Some(id));
    assert_eq!(ledger.user_id_by_referral(&code), Some(id));
    assert!(ledger.dirty.users.contains(&id));
}

#[test]
fn user_mut_bumps_version_and_marks_dirty() {
    let mut ledger = Ledger::new();
    let user = test_helpers::dummy_user(dec!(5));
    let id = user.id;
    ledger.insert_user(user);
    ledger.dirty.users.clear();

    ledger.user_mut(id).unwrap().balance = dec!(6);
    assert_eq!(ledger.user(id).unwrap().version, 2);
    assert!(ledger.dirty.users.contains(&id));
}

#[test]
fn unknown_user_is_an_error() {
    let ledger = Ledger::new();
    assert!(matches!(ledger.user(Uuid::nil()), Err(LedgerError::UserNotFound(_))));
}

#[test]
fn transactions_for_is_newest_first() {
    let mut ledger = Ledger::new();
    let user_id = Uuid::new_v4();
    let first = ledger.record(tx_for(user_id, TransactionType::Deposit, TransactionStatus::Completed));
    let second = ledger.record(tx_for(user_id, TransactionType::Fee, TransactionStatus::Completed));

    let ids: Vec<Uuid> = ledger.transactions_for(user_id).map(|tx| tx.id).collect();
    assert_eq!(ids, vec![second, first]);
    assert_eq!(ledger.transactions_for(Uuid::new_v4()).count(), 0);
}

#[test]
fn has_open_only_counts_pending_of_type() {
    let mut ledger = Ledger::new();
    let user_id = Uuid::new_v4();
    ledger.record(tx_for(user_id, TransactionType::Withdrawal, TransactionStatus::Completed));
    assert!(!ledger.has_open(user_id, TransactionType::Withdrawal));

    ledger.record(tx_for(user_id, TransactionType::Deposit, TransactionStatus::AwaitingConfirmation));
    assert!(!ledger.has_open(user_id, TransactionType::Withdrawal));
    assert!(ledger.has_open(user_id, TransactionType::Deposit));
}

#[test]
fn replay_returns_remembered_transactions() {
    let mut ledger = Ledger::new();
    let user_id = Uuid::new_v4();
    let id = ledger.record(tx_for(user_id, TransactionType::Transfer, TransactionStatus::Completed));
    ledger.remember(user_id, Some("key-1"), vec![id], Utc::now());

    let replayed = ledger.replay(user_id, Some("key-1")).unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].id, id);
    assert!(ledger.replay(user_id, Some("key-2")).is_none());
    assert!(ledger.replay(user_id, None).is_none());
    // Keys are scoped per user.
    assert!(ledger.replay(Uuid::new_v4(), Some("key-1")).is_none());
}

#[test]
fn ack_keeps_records_edited_after_snapshot() {
    let mut ledger = Ledger::new();
    let a = test_helpers::dummy_user(dec!(1));
    let b = test_helpers::dummy_user(dec!(1));
    let (a_id, b_id) = (a.id, b.id);
    ledger.insert_user(a);
    ledger.insert_user(b);

    let snapshot = ledger.snapshot_dirty();
    assert_eq!(snapshot.users.len(), 2);

    // B changes while the flush is in flight.
    ledger.user_mut(b_id).unwrap().balance = dec!(2);
    ledger.ack_flushed(&snapshot);

    assert!(!ledger.dirty.users.contains(&a_id));
    assert!(ledger.dirty.users.contains(&b_id));
}

#[test]
fn from_records_starts_clean_and_orders_history() {
    let user = test_helpers::dummy_user(dec!(1));
    let user_id = user.id;
    let now = Utc::now();
    let mut older = tx_for(user_id, TransactionType::Deposit, TransactionStatus::Completed);
    older.date = now - Duration::days(1);
    let mut newer = tx_for(user_id, TransactionType::Fee, TransactionStatus::Completed);
    newer.date = now;
    let (older_id, newer_id) = (older.id, newer.id);

    let ledger = Ledger::from_records(vec![user], vec![newer, older], Vec::new(), Vec::new());
    assert!(ledger.dirty.is_empty());
    let ids: Vec<Uuid> = ledger.transactions_for(user_id).map(|tx| tx.id).collect();
    assert_eq!(ids, vec![newer_id, older_id]);
}

#[test]
fn from_records_keeps_insertion_order_within_one_instant() {
    let user = test_helpers::dummy_user(dec!(1));
    let user_id = user.id;
    let now = Utc::now();
    let mut live = Ledger::new();
    let debit = live.record(Transaction::new(user_id, TransactionType::Transfer, dec!(-10), TransactionStatus::Completed, now));
    let fee = live.record(Transaction::new(user_id, TransactionType::Fee, dec!(-1), TransactionStatus::Completed, now));
    let refund = live.record(Transaction::new(user_id, TransactionType::Refund, dec!(1), TransactionStatus::Completed, now));
    let expected: Vec<Uuid> = live.transactions_for(user_id).map(|tx| tx.id).collect();
    assert_eq!(expected, vec![refund, fee, debit]);

    // Rows come back from the store in arbitrary order.
    let mut stored: Vec<Transaction> = live.transactions.values().cloned().collect();
    stored.sort_by_key(|tx| tx.id);
    stored.reverse();
    let mut hydrated = Ledger::from_records(vec![user], stored, Vec::new(), Vec::new());
    let ids: Vec<Uuid> = hydrated.transactions_for(user_id).map(|tx| tx.id).collect();
    assert_eq!(ids, expected);

    // New records continue after the hydrated ones.
    let later = hydrated.record(tx_for(user_id, TransactionType::Deposit, TransactionStatus::Completed));
    assert_eq!(hydrated.tx(later).unwrap().seq, 3);
}

#[test]
fn prune_idempotency_drops_only_old_keys() {
    let mut ledger = Ledger::new();
    let user_id = Uuid::new_v4();
    let now = Utc::now();
    let old = ledger.record(tx_for(user_id, TransactionType::Transfer, TransactionStatus::Completed));
    let fresh = ledger.record(tx_for(user_id, TransactionType::Transfer, TransactionStatus::Completed));
    ledger.remember(user_id, Some("old"), vec![old], now - Duration::hours(25));
    ledger.remember(user_id, Some("fresh"), vec![fresh], now - Duration::hours(1));

    assert_eq!(ledger.prune_idempotency(now - Duration::hours(24)), 1);
    assert!(ledger.replay(user_id, Some("old")).is_none());
    assert_eq!(ledger.replay(user_id, Some("fresh")).unwrap()[0].id, fresh);
    assert_eq!(ledger.prune_idempotency(now - Duration::hours(24)), 0);
}
