//! Pickup codes are presented in person to collect an order, so they double
//! as a bearer token and must come from a cryptographically secure source.

use std::future::Future;

use rand::{Rng, rngs::OsRng};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::{
    entity::orders::{Column as OrderCol, Entity as Orders},
    error::{AppError, AppResult},
};

/// Uppercase letters and digits without the look-alikes 0/O and 1/I.
pub const PICKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const MAX_PICKUP_CODE_ATTEMPTS: usize = 10;

/// Widest code the `orders.pickup_code` column can hold.
pub const MAX_PICKUP_CODE_LENGTH: usize = 10;

pub fn random_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| PICKUP_CODE_ALPHABET[rng.gen_range(0..PICKUP_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalizes user input before lookup. Codes are stored uppercase.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Draw codes until `is_taken` reports a free one.
///
/// Gives up with [`AppError::PickupCodeExhausted`] after
/// [`MAX_PICKUP_CODE_ATTEMPTS`] draws; that only happens when the code space
/// is close to full or the random source is broken, so the caller must not
/// retry.
pub async fn generate_unique_with<F, Fut>(length: usize, mut is_taken: F) -> AppResult<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = AppResult<bool>>,
{
    if length == 0 || length > MAX_PICKUP_CODE_LENGTH {
        return Err(AppError::Internal(anyhow::anyhow!(
            "pickup code length must be between 1 and {MAX_PICKUP_CODE_LENGTH}, got {length}"
        )));
    }

    for attempt in 1..=MAX_PICKUP_CODE_ATTEMPTS {
        let code = random_code(length);
        if !is_taken(code.clone()).await? {
            return Ok(code);
        }
        tracing::warn!(attempt, "pickup code collision");
    }

    tracing::error!(
        attempts = MAX_PICKUP_CODE_ATTEMPTS,
        length,
        "pickup code space exhausted"
    );
    Err(AppError::PickupCodeExhausted {
        attempts: MAX_PICKUP_CODE_ATTEMPTS,
    })
}

/// Generate a code not yet used by any order visible to `conn`.
pub async fn generate_unique<C: ConnectionTrait>(conn: &C, length: usize) -> AppResult<String> {
    generate_unique_with(length, |code| async move {
        let count = Orders::find()
            .filter(OrderCol::PickupCode.eq(code))
            .count(conn)
            .await?;
        Ok(count > 0)
    })
    .await
}
