use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use surplus_market_api::{
    error::AppError,
    services::pickup_code::{
        MAX_PICKUP_CODE_ATTEMPTS, PICKUP_CODE_ALPHABET, generate_unique_with, normalize,
        random_code,
    },
};

#[test]
fn codes_use_only_the_unambiguous_alphabet() {
    for _ in 0..500 {
        let code = random_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| PICKUP_CODE_ALPHABET.contains(&b)));
        assert!(!code.contains(['0', 'O', '1', 'I']));
    }
}

#[test]
fn normalize_trims_and_uppercases() {
    assert_eq!(normalize("  ab3xk9 \n"), "AB3XK9");
    assert_eq!(normalize("AB3XK9"), "AB3XK9");
}

#[tokio::test]
async fn ten_thousand_codes_are_distinct() -> anyhow::Result<()> {
    let mut issued = HashSet::new();
    for _ in 0..10_000 {
        let code = generate_unique_with(6, |candidate| {
            let hit = issued.contains(&candidate);
            async move { Ok(hit) }
        })
        .await?;
        assert!(issued.insert(code));
    }
    assert_eq!(issued.len(), 10_000);
    Ok(())
}

#[tokio::test]
async fn collisions_are_redrawn() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let code = generate_unique_with(6, move |_| {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        async move { Ok(n < 3) }
    })
    .await?;

    assert_eq!(code.len(), 6);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test]
async fn gives_up_after_bounded_attempts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let err = generate_unique_with(6, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Ok(true) }
    })
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        AppError::PickupCodeExhausted {
            attempts: MAX_PICKUP_CODE_ATTEMPTS
        }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), MAX_PICKUP_CODE_ATTEMPTS);
}

#[tokio::test]
async fn zero_length_is_a_configuration_error() {
    let err = generate_unique_with(0, |_| async { Ok(false) })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
}
