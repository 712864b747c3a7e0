//! Basket inventory ledger.
//!
//! `quantity_left` is changed only here, by single guarded `UPDATE`
//! statements executed on the caller's connection. Pass the enclosing
//! transaction so that a rollback also undoes the quantity change.

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    entity::baskets::{BasketStatus, Column as BasketCol, Entity as Baskets, Model as BasketModel},
    error::{AppError, AppResult},
};

/// Remove `quantity` units from the basket, flipping it to SOLD_OUT when the
/// last unit goes.
pub async fn decrement_quantity<C: ConnectionTrait>(
    conn: &C,
    basket: &BasketModel,
    quantity: i32,
) -> AppResult<BasketModel> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be greater than 0".into()));
    }
    if quantity > basket.quantity_left {
        return Err(AppError::InsufficientInventory {
            requested: quantity,
            available: basket.quantity_left,
        });
    }

    let result = Baskets::update_many()
        .col_expr(BasketCol::QuantityLeft, Expr::col(BasketCol::QuantityLeft).sub(quantity))
        .col_expr(BasketCol::UpdatedAt, Expr::value(now()))
        .filter(BasketCol::Id.eq(basket.id))
        .filter(BasketCol::QuantityLeft.gte(quantity))
        .exec(conn)
        .await?;

    let mut updated = reload(conn, basket.id).await?;
    if result.rows_affected == 0 {
        // Another writer got there first; report what is really left.
        return Err(AppError::InsufficientInventory {
            requested: quantity,
            available: updated.quantity_left,
        });
    }

    if updated.quantity_left == 0 && updated.status != BasketStatus::SoldOut {
        set_status(conn, updated.id, BasketStatus::SoldOut).await?;
        updated.status = BasketStatus::SoldOut;
        tracing::info!(basket_id = %updated.id, "basket is now sold out");
    }

    Ok(updated)
}

/// Return `quantity` units to the basket.
///
/// A SOLD_OUT basket whose pickup window is still open goes back to
/// PUBLISHED; any other status is left alone, so an EXPIRED basket stays
/// expired. Pushing `quantity_left` past `quantity_total` is refused and
/// aborts the caller's unit of work.
pub async fn increment_quantity<C: ConnectionTrait>(
    conn: &C,
    basket: &BasketModel,
    quantity: i32,
) -> AppResult<BasketModel> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be greater than 0".into()));
    }

    let result = Baskets::update_many()
        .col_expr(BasketCol::QuantityLeft, Expr::col(BasketCol::QuantityLeft).add(quantity))
        .col_expr(BasketCol::UpdatedAt, Expr::value(now()))
        .filter(BasketCol::Id.eq(basket.id))
        .filter(
            Expr::col(BasketCol::QuantityLeft).lte(Expr::col(BasketCol::QuantityTotal).sub(quantity)),
        )
        .exec(conn)
        .await?;

    let mut updated = reload(conn, basket.id).await?;
    if result.rows_affected == 0 {
        tracing::error!(
            basket_id = %basket.id,
            quantity,
            quantity_left = updated.quantity_left,
            quantity_total = updated.quantity_total,
            "restock would exceed basket total"
        );
        return Err(AppError::Internal(anyhow::anyhow!(
            "restocking {} units would exceed total of basket {}",
            quantity,
            basket.id
        )));
    }

    if updated.status == BasketStatus::SoldOut
        && updated.quantity_left > 0
        && updated.pickup_end > now()
    {
        set_status(conn, updated.id, BasketStatus::Published).await?;
        updated.status = BasketStatus::Published;
        tracing::info!(basket_id = %updated.id, "basket republished after restock");
    }

    Ok(updated)
}

/// Expire PUBLISHED baskets whose pickup window has closed.
pub async fn expire_baskets<C: ConnectionTrait>(conn: &C) -> AppResult<u64> {
    let now = now();
    let result = Baskets::update_many()
        .col_expr(BasketCol::Status, Expr::value(BasketStatus::Expired))
        .col_expr(BasketCol::UpdatedAt, Expr::value(now))
        .filter(BasketCol::Status.eq(BasketStatus::Published))
        .filter(BasketCol::PickupEnd.lt(now))
        .exec(conn)
        .await?;
    if result.rows_affected > 0 {
        tracing::info!(count = result.rows_affected, "expired baskets");
    }
    Ok(result.rows_affected)
}

/// Mark PUBLISHED baskets with nothing left as SOLD_OUT.
pub async fn mark_sold_out_baskets<C: ConnectionTrait>(conn: &C) -> AppResult<u64> {
    let result = Baskets::update_many()
        .col_expr(BasketCol::Status, Expr::value(BasketStatus::SoldOut))
        .col_expr(BasketCol::UpdatedAt, Expr::value(now()))
        .filter(BasketCol::Status.eq(BasketStatus::Published))
        .filter(BasketCol::QuantityLeft.eq(0))
        .exec(conn)
        .await?;
    if result.rows_affected > 0 {
        tracing::info!(count = result.rows_affected, "marked baskets as sold out");
    }
    Ok(result.rows_affected)
}

async fn set_status<C: ConnectionTrait>(conn: &C, id: Uuid, status: BasketStatus) -> AppResult<()> {
    Baskets::update_many()
        .col_expr(BasketCol::Status, Expr::value(status))
        .filter(BasketCol::Id.eq(id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn reload<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<BasketModel> {
    Baskets::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Basket"))
}

fn now() -> sea_orm::prelude::DateTimeWithTimeZone {
    Utc::now().fixed_offset()
}
