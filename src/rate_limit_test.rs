use super::*;

fn limiter(per_user_limit: usize, global_limit: usize) -> RateLimiter {
    RateLimiter::with_config(RateLimitConfig {
        per_user_limit,
        per_user_window: Duration::from_secs(60),
        global_limit,
        global_window: Duration::from_secs(60),
    })
}

#[test]
fn per_user_allows_up_to_limit() {
    let rl = limiter(3, 100);
    let user = Uuid::new_v4();
    let now = Instant::now();

    for i in 0..3 {
        assert!(rl.check_and_record_at(user, now).is_ok(), "request {i} should succeed");
    }
    assert!(matches!(
        rl.check_and_record_at(user, now),
        Err(RateLimitError::PerUserExceeded { limit: 3, window_secs: 60 })
    ));
}

#[test]
fn global_allows_up_to_limit() {
    let rl = limiter(100, 4);
    let now = Instant::now();

    // Distinct users so the per-user limit never trips first.
    for i in 0..4 {
        assert!(rl.check_and_record_at(Uuid::new_v4(), now).is_ok(), "request {i} should succeed");
    }
    assert!(matches!(
        rl.check_and_record_at(Uuid::new_v4(), now),
        Err(RateLimitError::GlobalExceeded { .. })
    ));
}

#[test]
fn window_expiry_allows_new_requests() {
    let rl = limiter(2, 100);
    let user = Uuid::new_v4();
    let start = Instant::now();

    rl.check_and_record_at(user, start).unwrap();
    rl.check_and_record_at(user, start).unwrap();
    assert!(rl.check_and_record_at(user, start).is_err());

    let after_window = start + Duration::from_secs(60) + Duration::from_millis(1);
    assert!(rl.check_and_record_at(user, after_window).is_ok());
}

#[test]
fn distinct_users_do_not_interfere() {
    let rl = limiter(1, 100);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let now = Instant::now();

    rl.check_and_record_at(a, now).unwrap();
    assert!(rl.check_and_record_at(a, now).is_err());
    assert!(rl.check_and_record_at(b, now).is_ok());
}

#[test]
fn rejected_request_is_not_recorded_globally() {
    let rl = limiter(1, 2);
    let a = Uuid::new_v4();
    let now = Instant::now();

    rl.check_and_record_at(a, now).unwrap();
    assert!(rl.check_and_record_at(a, now).is_err());
    // Global still has one slot left because the rejected call was not counted.
    assert!(rl.check_and_record_at(Uuid::new_v4(), now).is_ok());
}

#[test]
fn converts_into_ledger_error() {
    let err: crate::error::LedgerError = RateLimitError::PerUserExceeded { limit: 1, window_secs: 60 }.into();
    assert!(matches!(err, crate::error::LedgerError::RateLimited(_)));
}
