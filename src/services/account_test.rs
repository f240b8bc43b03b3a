use super::*;
use crate::config::AppConfig;
use crate::state::test_helpers;
use rust_decimal_macros::dec;

// =============================================================================
// normalize_email
// =============================================================================

#[test]
fn normalize_email_lowercases_and_trims() {
    assert_eq!(normalize_email("  Alice@Example.COM "), Some("alice@example.com".into()));
}

#[test]
fn normalize_email_rejects_malformed() {
    assert!(normalize_email("").is_none());
    assert!(normalize_email("no-at-sign").is_none());
    assert!(normalize_email("@example.com").is_none());
    assert!(normalize_email("alice@").is_none());
    assert!(normalize_email("a@b@c").is_none());
}

#[test]
fn normalize_name_falls_back_to_email_local_part() {
    assert_eq!(normalize_name("   ", "carol@example.com"), "carol");
    assert_eq!(normalize_name(" Carol ", "carol@example.com"), "Carol");
}

#[test]
fn password_hash_verifies() {
    let hash = hash_password("correct horse").unwrap();
    assert!(verify_password("correct horse", &hash));
    assert!(!verify_password("wrong horse", &hash));
    assert!(!verify_password("correct horse", "not-a-phc-string"));
}

// =============================================================================
// register / authenticate
// =============================================================================

#[tokio::test]
async fn register_then_login() {
    let state = test_helpers::test_app_state();
    let user = register(&state, "Dana@Example.com", "Dana", "hunter2hunter2", None).await.unwrap();
    assert_eq!(user.email, "dana@example.com");
    assert_eq!(user.role, Role::User);
    assert_eq!(user.referral_code.len(), REFERRAL_CODE_LEN);

    let logged_in = authenticate(&state, "dana@example.com", "hunter2hunter2").await.unwrap();
    assert_eq!(logged_in.id, user.id);

    let err = authenticate(&state, "dana@example.com", "nope-nope").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidCredentials));
}

#[tokio::test]
async fn register_rejects_short_password_and_duplicates() {
    let state = test_helpers::test_app_state();
    let short = register(&state, "eve@example.com", "Eve", "short", None).await.unwrap_err();
    assert!(matches!(short, LedgerError::InvalidInput(_)));

    let existing = test_helpers::seed_user(&state, dec!(0)).await;
    let email = test_helpers::user(&state, existing).await.email;
    let dup = register(&state, &email, "Again", "longenough", None).await.unwrap_err();
    assert!(matches!(dup, LedgerError::EmailTaken));
}

#[tokio::test]
async fn register_records_referrer_and_rejects_unknown_codes() {
    let state = test_helpers::test_app_state();
    let referrer = test_helpers::seed_user(&state, dec!(0)).await;
    let code = test_helpers::user(&state, referrer).await.referral_code;

    let referred = register(&state, "frank@example.com", "Frank", "longenough", Some(&code.to_ascii_lowercase()))
        .await
        .unwrap();
    assert_eq!(referred.referred_by, Some(referrer));

    let err = register(&state, "gina@example.com", "Gina", "longenough", Some("ZZZZZZZZ")).await.unwrap_err();
    assert!(matches!(err, LedgerError::RecipientNotFound));
}

#[tokio::test]
async fn admin_emails_register_as_admin() {
    let mut config = AppConfig::default();
    config.admin_emails.insert("ops@vaultchain.io".into());
    let state = test_helpers::test_app_state_with_config(config);
    let admin = register(&state, "OPS@vaultchain.io", "Ops", "longenough", None).await.unwrap();
    assert_eq!(admin.role, Role::Admin);
}

#[tokio::test]
async fn banned_user_cannot_login() {
    let state = test_helpers::test_app_state();
    let user = register(&state, "hal@example.com", "Hal", "longenough", None).await.unwrap();
    test_helpers::edit_user(&state, user.id, |u| u.is_banned = true).await;
    let err = authenticate(&state, "hal@example.com", "longenough").await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountBanned));
}

// =============================================================================
// admin controls
// =============================================================================

#[tokio::test]
async fn update_user_requires_admin() {
    let state = test_helpers::test_app_state();
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    let other = test_helpers::seed_user(&state, dec!(0)).await;
    let err = update_user(&state, user, other, UserUpdate { frozen: Some(true), ..UserUpdate::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Forbidden));
}

#[tokio::test]
async fn update_user_applies_only_given_fields() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    test_helpers::edit_user(&state, user, |u| u.is_fee_exempt = true).await;

    let updated = update_user(&state, admin, user, UserUpdate { frozen: Some(true), ..UserUpdate::default() })
        .await
        .unwrap();
    assert!(updated.is_frozen);
    assert!(updated.is_fee_exempt);
    assert!(!updated.is_banned);
    assert_eq!(updated.role, Role::User);
}

#[tokio::test]
async fn update_user_sets_flags_and_role_together() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    let update = UserUpdate { fee_exempt: Some(true), role: Some(Role::Admin), ..UserUpdate::default() };

    let updated = update_user(&state, admin, user, update).await.unwrap();
    assert!(updated.is_fee_exempt);
    assert_eq!(updated.role, Role::Admin);
}

#[tokio::test]
async fn admin_cannot_ban_or_demote_self() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let ban = update_user(&state, admin, admin, UserUpdate { banned: Some(true), ..UserUpdate::default() }).await;
    assert!(matches!(ban, Err(LedgerError::InvalidState(_))));
    let demote = update_user(&state, admin, admin, UserUpdate { role: Some(Role::User), ..UserUpdate::default() }).await;
    assert!(matches!(demote, Err(LedgerError::InvalidState(_))));
}

#[tokio::test]
async fn refused_update_changes_nothing() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let before = test_helpers::user(&state, admin).await;
    let update = UserUpdate { fee_exempt: Some(true), role: Some(Role::User), ..UserUpdate::default() };

    let err = update_user(&state, admin, admin, update).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));

    let after = test_helpers::user(&state, admin).await;
    assert_eq!(after.is_fee_exempt, before.is_fee_exempt);
    assert_eq!(after.role, Role::Admin);
    assert_eq!(after.version, before.version);
}

#[tokio::test]
async fn adjust_balance_credits_and_debits() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(50)).await;

    let credit = adjust_balance(&state, admin, user, dec!(25), "goodwill").await.unwrap();
    assert_eq!(credit.tx_type, TransactionType::Adjustment);
    assert_eq!(credit.amount, dec!(25));
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(75));

    adjust_balance(&state, admin, user, dec!(-75), "chargeback").await.unwrap();
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(0));
}

#[tokio::test]
async fn adjust_balance_cannot_go_negative() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(10)).await;
    let err = adjust_balance(&state, admin, user, dec!(-10.01), "too much").await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(10));
    assert_eq!(state.ledger.read().await.transactions_for(user).count(), 0);
}

#[tokio::test]
async fn adjust_balance_refuses_amounts_past_the_ceiling() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    let huge = crate::money::MAX_AMOUNT + dec!(0.01);
    let err = adjust_balance(&state, admin, user, huge, "typo").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));
    assert_eq!(test_helpers::user(&state, user).await.balance, dec!(0));
}

#[tokio::test]
async fn adjust_balance_requires_reason() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(10)).await;
    let err = adjust_balance(&state, admin, user, dec!(1), "   ").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn list_users_is_admin_only() {
    let state = test_helpers::test_app_state();
    let admin = test_helpers::seed_admin(&state).await;
    let user = test_helpers::seed_user(&state, dec!(0)).await;
    assert_eq!(list_users(&state, admin).await.unwrap().len(), 2);
    assert!(matches!(list_users(&state, user).await, Err(LedgerError::Forbidden)));
}
