use super::*;
use crate::config::AppConfig;
use crate::state::test_helpers;
use rust_decimal_macros::dec;

fn deposit(amount: Decimal) -> DepositRequest {
    DepositRequest { amount, original_amount: None, original_currency: None }
}

fn send(recipient: impl Into<String>, amount: Decimal) -> TransferRequest {
    TransferRequest { recipient: recipient.into(), amount, note: None }
}

// =============================================================================
// deposits
// =============================================================================

#[tokio::test]
async fn deposit_waits_for_approval() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(0)).await;

    let tx = request_deposit(&state, user, deposit(dec!(250)), None).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::AwaitingConfirmation);
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(0));
    assert_eq!(summary(&state, user).await.unwrap().pending_deposits, dec!(250));

    let approved = approve_deposit(&state, admin, tx.id).await.unwrap();
    assert_eq!(approved.status, TransactionStatus::Completed);
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(250));
}

#[tokio::test]
async fn deposit_keeps_original_currency() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    let request = DepositRequest {
        amount: dec!(108.40),
        original_amount: Some(dec!(100)),
        original_currency: Some(" eur ".into()),
    };
    let tx = request_deposit(&state, user, request, None).await.unwrap();
    assert_eq!(tx.original_amount, Some(dec!(100)));
    assert_eq!(tx.original_currency.as_deref(), Some("EUR"));
}

#[tokio::test]
async fn deposit_refuses_amounts_the_store_cannot_hold() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    let huge = crate::money::MAX_AMOUNT + dec!(0.01);

    let err = request_deposit(&state, user, deposit(huge), None).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));

    let request = DepositRequest { amount: dec!(10), original_amount: Some(huge), original_currency: None };
    let err = request_deposit(&state, user, request, None).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));
    assert_eq!(state.ledger.read().await.transactions_for(user).count(), 0);
}

#[tokio::test]
async fn rejected_deposit_credits_nothing() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(5)).await;
    let tx = request_deposit(&state, user, deposit(dec!(40)), None).await.unwrap();

    let rejected = reject_deposit(&state, admin, tx.id).await.unwrap();
    assert_eq!(rejected.status, TransactionStatus::Rejected);
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(5));

    let again = approve_deposit(&state, admin, tx.id).await.unwrap_err();
    assert!(matches!(again, LedgerError::InvalidState(_)));
}

#[tokio::test]
async fn open_deposits_are_capped() {
    let config = AppConfig { max_pending_deposits: 2, ..AppConfig::default() };
    let state = test_helpers::test_app_state_with_config(config);
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    request_deposit(&state, user, deposit(dec!(10)), None).await.unwrap();
    request_deposit(&state, user, deposit(dec!(10)), None).await.unwrap();
    let err = request_deposit(&state, user, deposit(dec!(10)), None).await.unwrap_err();
    assert!(matches!(err, LedgerError::PendingRequestExists("deposit")));
}

#[tokio::test]
async fn banned_user_cannot_deposit() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    test_helpers::edit_user(&state, user, |u| u.is_banned = true).await;
    let err = request_deposit(&state, user, deposit(dec!(10)), None).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountBanned));
}

#[tokio::test]
async fn deposit_replays_idempotency_key() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    let first = request_deposit(&state, user, deposit(dec!(10)), Some("k-1")).await.unwrap();
    let second = request_deposit(&state, user, deposit(dec!(99)), Some("k-1")).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.amount, dec!(10));
    assert_eq!(state.ledger.read().await.count_open(user, TransactionType::Deposit), 1);
}

#[tokio::test]
async fn first_deposit_pays_referral_bonus_once() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let referrer = test_helpers::seed_user(&state, dec!(0)).await;
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    test_helpers::edit_user(&state, user, |u| u.referred_by = Some(referrer)).await;

    let first = request_deposit(&state, user, deposit(dec!(200)), None).await.unwrap();
    let second = request_deposit(&state, user, deposit(dec!(300)), None).await.unwrap();
    approve_deposit(&state, admin, first.id).await.unwrap();
    approve_deposit(&state, admin, second.id).await.unwrap();

    // 5% of the first deposit only
    assert_eq!(test_helpers::user(&state, referrer).await.balance, dec!(10.00));
    let ledger = state.ledger.read().await;
    let rewards: Vec<_> = ledger.transactions_for(referrer).collect();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].tx_type, TransactionType::Referral);
    assert_eq!(rewards[0].related_id, Some(first.id));
}

#[tokio::test]
async fn banned_referrer_gets_no_bonus() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let referrer = test_helpers::seed_user(&state, dec!(0)).await;
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    test_helpers::edit_user(&state, user, |u| u.referred_by = Some(referrer)).await;
    test_helpers::edit_user(&state, referrer, |u| u.is_banned = true).await;

    let tx = request_deposit(&state, user, deposit(dec!(200)), None).await.unwrap();
    approve_deposit(&state, admin, tx.id).await.unwrap();
    assert_eq!(test_helpers::user(&state, referrer).await.balance, dec!(0));
}

#[tokio::test]
async fn only_admins_approve_deposits() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    let tx = request_deposit(&state, user, deposit(dec!(10)), None).await.unwrap();
    assert!(matches!(approve_deposit(&state, user, tx.id).await, Err(LedgerError::Forbidden)));
}

// =============================================================================
// transfers
// =============================================================================

#[tokio::test]
async fn transfer_by_referral_code_moves_funds() {
    let state = test_helpers::test_app_state();
    let sender = test_helpers::seed_user(&state, dec!(100)).await;
    let recipient = test_helpers::seed_user(&state, dec!(0)).await;
    let code = test_helpers::user(&state, recipient).await.referral_code.to_ascii_lowercase();

    let txs = transfer(&state, sender, send(code, dec!(40)), None).await.unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].amount, dec!(-40));
    assert_eq!(txs[0].recipient_id, Some(recipient));
    assert_eq!(txs[1].user_id, recipient);
    assert_eq!(txs[1].amount, dec!(40));
    assert_eq!(test_helpers::user(&state, sender).await.balance, dec!(60));
    assert_eq!(test_helpers::user(&state, recipient).await.balance, dec!(40));
}

#[tokio::test]
async fn transfer_resolves_email_and_id() {
    let state = test_helpers::test_app_state();
    let sender = test_helpers::seed_user(&state, dec!(100)).await;
    let recipient = test_helpers::seed_user(&state, dec!(0)).await;
    let email = test_helpers::user(&state, recipient).await.email.to_ascii_uppercase();

    transfer(&state, sender, send(email, dec!(1)), None).await.unwrap();
    transfer(&state, sender, send(recipient.to_string(), dec!(2)), None).await.unwrap();
    assert_eq!(test_helpers::user(&state, recipient).await.balance, dec!(3));
}

#[tokio::test]
async fn transfer_fee_is_charged_unless_exempt() {
    let config = AppConfig { transfer_fee_bps: 100, ..AppConfig::default() };
    let state = test_helpers::test_app_state_with_config(config);
    let sender = test_helpers::seed_user(&state, dec!(100)).await;
    let recipient = test_helpers::seed_user(&state, dec!(0)).await;

    let txs = transfer(&state, sender, send(recipient.to_string(), dec!(50)), None).await.unwrap();
    assert_eq!(txs.len(), 3);
    assert_eq!(txs[2].tx_type, TransactionType::Fee);
    assert_eq!(txs[2].amount, dec!(-0.50));
    assert_eq!(txs[2].related_id, Some(txs[0].id));
    assert_eq!(test_helpers::user(&state, sender).await.balance, dec!(49.50));

    test_helpers::edit_user(&state, sender, |u| u.is_fee_exempt = true).await;
    let txs = transfer(&state, sender, send(recipient.to_string(), dec!(10)), None).await.unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(test_helpers::user(&state, sender).await.balance, dec!(39.50));
}

#[tokio::test]
async fn transfer_needs_amount_plus_fee() {
    let config = AppConfig { transfer_fee_bps: 100, ..AppConfig::default() };
    let state = test_helpers::test_app_state_with_config(config);
    let sender = test_helpers::seed_user(&state, dec!(50)).await;
    let recipient = test_helpers::seed_user(&state, dec!(0)).await;

    let err = transfer(&state, sender, send(recipient.to_string(), dec!(50)), None).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { needed, .. } if needed == dec!(50.50)));
    assert_eq!(test_helpers::user(&state, sender).await.balance, dec!(50));
    assert_eq!(state.ledger.read().await.transactions_for(sender).count(), 0);
}

#[tokio::test]
async fn transfer_rejects_self_unknown_and_banned_recipients() {
    let state = test_helpers::test_app_state();
    let sender = test_helpers::seed_user(&state, dec!(100)).await;
    let banned = test_helpers::seed_user(&state, dec!(0)).await;
    test_helpers::edit_user(&state, banned, |u| u.is_banned = true).await;

    let own = transfer(&state, sender, send(sender.to_string(), dec!(1)), None).await.unwrap_err();
    assert!(matches!(own, LedgerError::InvalidInput(_)));
    let unknown = transfer(&state, sender, send("NOSUCHCODE", dec!(1)), None).await.unwrap_err();
    assert!(matches!(unknown, LedgerError::RecipientNotFound));
    let gone = transfer(&state, sender, send(banned.to_string(), dec!(1)), None).await.unwrap_err();
    assert!(matches!(gone, LedgerError::RecipientNotFound));
}

#[tokio::test]
async fn frozen_sender_cannot_transfer_but_can_receive() {
    let state = test_helpers::test_app_state();
    let frozen = test_helpers::seed_user(&state, dec!(100)).await;
    let other = test_helpers::seed_user(&state, dec!(100)).await;
    test_helpers::edit_user(&state, frozen, |u| u.is_frozen = true).await;

    let err = transfer(&state, frozen, send(other.to_string(), dec!(1)), None).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountFrozen));
    transfer(&state, other, send(frozen.to_string(), dec!(1)), None).await.unwrap();
    assert_eq!(test_helpers::user(&state, frozen).await.balance, dec!(101));
}

#[tokio::test]
async fn transfer_replay_does_not_double_spend() {
    let state = test_helpers::test_app_state();
    let sender = test_helpers::seed_user(&state, dec!(100)).await;
    let recipient = test_helpers::seed_user(&state, dec!(0)).await;

    let first = transfer(&state, sender, send(recipient.to_string(), dec!(30)), Some("pay-1")).await.unwrap();
    let second = transfer(&state, sender, send(recipient.to_string(), dec!(30)), Some("pay-1")).await.unwrap();
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(test_helpers::user(&state, sender).await.balance, dec!(70));

    // the same key on a different operation is independent
    let dep = request_deposit(&state, sender, deposit(dec!(5)), Some("pay-1")).await.unwrap();
    assert_eq!(dep.tx_type, TransactionType::Deposit);
}

#[tokio::test]
async fn concurrent_transfers_cannot_overdraw() {
    let state = test_helpers::test_app_state();
    let sender = test_helpers::seed_user(&state, dec!(100)).await;
    let recipient = test_helpers::seed_user(&state, dec!(0)).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let state = state.clone();
        let to = recipient.to_string();
        handles.push(tokio::spawn(async move { transfer(&state, sender, send(to, dec!(30)), None).await }));
    }
    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 3);
    assert_eq!(test_helpers::user(&state, sender).await.balance, dec!(10));
    assert_eq!(test_helpers::user(&state, recipient).await.balance, dec!(90));
}

// =============================================================================
// history
// =============================================================================

#[tokio::test]
async fn list_transactions_pages_newest_first() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    for amount in [dec!(1), dec!(2), dec!(3)] {
        request_deposit(&state, user, deposit(amount), None).await.unwrap();
    }
    let page = list_transactions(&state, user, Some(2), None).await.unwrap();
    assert_eq!(page.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![dec!(3), dec!(2)]);
    let rest = list_transactions(&state, user, Some(2), Some(2)).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].amount, dec!(1));
}
