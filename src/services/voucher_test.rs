use super::*;
use crate::services::CODE_ALPHABET;
use crate::state::test_helpers;
use rust_decimal_macros::dec;

#[tokio::test]
async fn create_debits_creator_and_formats_code() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(100)).await;
    let voucher = create(&state, user, dec!(25), None).await.unwrap();

    let parts: Vec<&str> = voucher.code.split('-').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "VC");
    assert!(parts[1..].iter().all(|p| p.len() == 4 && p.bytes().all(|b| CODE_ALPHABET.contains(&b))));
    assert_eq!(voucher.status, VoucherStatus::Active);
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(75));
}

#[tokio::test]
async fn create_requires_funds() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(10)).await;
    let err = create(&state, user, dec!(10.01), None).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert!(state.ledger.read().await.vouchers.is_empty());
}

#[tokio::test]
async fn create_replays_idempotency_key() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(100)).await;
    let first = create(&state, user, dec!(20), Some("gift")).await.unwrap();
    let again = create(&state, user, dec!(20), Some("gift")).await.unwrap();
    assert_eq!(first.code, again.code);
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(80));
}

#[tokio::test]
async fn redeem_credits_once() {
    let state = test_helpers::test_app_state();
    let creator = test_helpers::seed_user(&state, dec!(100)).await;
    let a = test_helpers::seed_user(&state, dec!(0)).await;
    let b = test_helpers::seed_user(&state, dec!(0)).await;
    let voucher = create(&state, creator, dec!(40), None).await.unwrap();

    let tx = redeem(&state, a, &format!("  {} ", voucher.code.to_ascii_lowercase())).await.unwrap();
    assert_eq!(tx.amount, dec!(40));
    assert_eq!(test_helpers::user(&state, a).await.balance, dec!(40));

    let twice = redeem(&state, b, &voucher.code).await.unwrap_err();
    assert!(matches!(twice, LedgerError::VoucherUnavailable));
    let stored = state.ledger.read().await.vouchers[&voucher.code].clone();
    assert_eq!(stored.status, VoucherStatus::Redeemed);
    assert_eq!(stored.redeemed_by, Some(a));
}

#[tokio::test]
async fn creator_cannot_redeem_own_voucher() {
    let state = test_helpers::test_app_state();
    let creator = test_helpers::seed_user(&state, dec!(100)).await;
    let voucher = create(&state, creator, dec!(40), None).await.unwrap();
    let err = redeem(&state, creator, &voucher.code).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    assert!(matches!(redeem(&state, user, "VC-AAAA-BBBB").await, Err(LedgerError::VoucherNotFound)));
}

#[tokio::test]
async fn cancel_refunds_creator_and_blocks_redeem() {
    let state = test_helpers::test_app_state();
    let creator = test_helpers::seed_user(&state, dec!(100)).await;
    let other = test_helpers::seed_user(&state, dec!(0)).await;
    let voucher = create(&state, creator, dec!(30), None).await.unwrap();

    let refund = cancel(&state, creator, &voucher.code).await.unwrap();
    assert_eq!(refund.amount, dec!(30));
    assert_eq!(test_helpers::user(&state, creator).await.balance, dec!(100));

    assert!(matches!(redeem(&state, other, &voucher.code).await, Err(LedgerError::VoucherUnavailable)));
    assert!(matches!(cancel(&state, creator, &voucher.code).await, Err(LedgerError::VoucherUnavailable)));
}

#[tokio::test]
async fn someone_elses_voucher_looks_unknown_to_cancel() {
    let state = test_helpers::test_app_state();
    let creator = test_helpers::seed_user(&state, dec!(100)).await;
    let other = test_helpers::seed_user(&state, dec!(0)).await;
    let voucher = create(&state, creator, dec!(30), None).await.unwrap();

    let foreign = cancel(&state, other, &voucher.code).await.unwrap_err();
    assert!(matches!(foreign, LedgerError::VoucherNotFound));
    let unknown = cancel(&state, other, "VC-AAAA-BBBB").await.unwrap_err();
    assert_eq!(foreign.to_string(), unknown.to_string());

    let redeemed = redeem(&state, other, &voucher.code).await.unwrap();
    assert_eq!(redeemed.amount, dec!(30));
}

#[tokio::test]
async fn list_shows_created_vouchers() {
    let state = test_helpers::test_app_state();
    let creator = test_helpers::seed_user(&state, dec!(100)).await;
    create(&state, creator, dec!(1), None).await.unwrap();
    create(&state, creator, dec!(2), None).await.unwrap();
    assert_eq!(list(&state, creator).await.unwrap().len(), 2);
}
