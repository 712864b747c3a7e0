use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    db::{self, begin_serializable},
    entity::{
        baskets::{Entity as Baskets, Model as BasketModel},
        notifications::NotificationKind,
        orders::{Model as OrderModel, OrderStatus},
        payments::{
            Column as PaymentCol, Entity as Payments, Model as PaymentModel, PaymentProvider,
            PaymentStatus,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Payment,
    response::ApiResponse,
    services::{
        order_service::{ensure_order_access, find_order_or_throw},
        shop_service,
    },
    state::AppState,
};

pub async fn get_payment_by_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    let order = find_order_or_throw(&state.orm, order_id).await?;
    ensure_order_access(&state.orm, &order, user).await?;

    let payment = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))?;
    Ok(ApiResponse::item("OK", payment.into()))
}

/// Let the customer pick how they will pay, as long as nothing has been
/// paid or started yet.
pub async fn update_payment_provider(
    state: &AppState,
    user: &AuthUser,
    payment_id: Uuid,
    provider: PaymentProvider,
) -> AppResult<ApiResponse<Payment>> {
    let payment = find_payment_or_throw(&state.orm, payment_id).await?;
    let order = find_order_or_throw(&state.orm, payment.order_id).await?;
    if order.user_id != user.user_id {
        return Err(AppError::forbidden(
            "Only the order owner can change the payment provider",
        ));
    }
    ensure_not_cancelled(&order)?;
    if payment.status != PaymentStatus::Unpaid {
        return Err(AppError::InvalidStateTransition(format!(
            "Provider can only change on unpaid payments. Current status: {}",
            payment.status
        )));
    }

    let result = Payments::update_many()
        .col_expr(PaymentCol::Provider, Expr::value(provider))
        .col_expr(PaymentCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(PaymentCol::Id.eq(payment.id))
        .filter(PaymentCol::Status.eq(PaymentStatus::Unpaid))
        .exec(&state.orm)
        .await?;
    let payment = find_payment_or_throw(&state.orm, payment.id).await?;
    if result.rows_affected == 0 {
        return Err(AppError::InvalidStateTransition(format!(
            "Payment changed concurrently. Current status: {}",
            payment.status
        )));
    }

    tracing::info!(payment_id = %payment.id, ?provider, "payment provider updated");
    Ok(ApiResponse::item("Payment provider updated", payment.into()))
}

/// UNPAID -> PENDING, for payments started outside the platform.
pub async fn mark_as_pending(
    state: &AppState,
    user: &AuthUser,
    payment_id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    let payment = find_payment_or_throw(&state.orm, payment_id).await?;
    let order = find_order_or_throw(&state.orm, payment.order_id).await?;
    ensure_order_access(&state.orm, &order, user).await?;
    ensure_not_cancelled(&order)?;
    if payment.status != PaymentStatus::Unpaid {
        return Err(AppError::InvalidStateTransition(format!(
            "Only unpaid payments can be marked as pending. Current status: {}",
            payment.status
        )));
    }

    let payment = move_status(
        &state.orm,
        &payment,
        &[PaymentStatus::Unpaid],
        PaymentStatus::Pending,
        None,
    )
    .await?;

    tracing::info!(payment_id = %payment.id, "payment marked as pending");
    Ok(ApiResponse::item("Payment marked as pending", payment.into()))
}

/// Record a payment settled outside the platform. Only the shop owner (or an
/// admin) may do this. Runs under the basket lock so it cannot interleave
/// with a cancellation of the same order.
pub async fn mark_as_paid(
    state: &AppState,
    user: &AuthUser,
    payment_id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    let (payment, order, basket) = db::retry_on_conflict("mark_as_paid", || {
        try_mark_as_paid(state, user.user_id, payment_id)
    })
    .await?;

    tracing::info!(payment_id = %payment.id, order_id = %order.id, "payment marked as paid");
    state.notifier.notify(
        order.user_id,
        "Payment received",
        format!(
            "We received your payment of {} {} for {}.",
            payment.amount, payment.currency, basket.title
        ),
        NotificationKind::PaymentReceived,
    );
    audit::record(
        &state.orm,
        user.user_id,
        "payment_paid",
        "payments",
        serde_json::json!({ "payment_id": payment.id, "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::item("Payment marked as paid", payment.into()))
}

async fn try_mark_as_paid(
    state: &AppState,
    merchant_id: Uuid,
    payment_id: Uuid,
) -> AppResult<(PaymentModel, OrderModel, BasketModel)> {
    let txn = begin_serializable(&state.orm).await?;

    let payment = find_payment_or_throw(&txn, payment_id).await?;
    let order = find_order_or_throw(&txn, payment.order_id).await?;
    let basket = Baskets::find_by_id(order.basket_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Basket"))?;
    let shop = shop_service::find_shop_or_throw(&txn, basket.shop_id).await?;
    shop_service::check_shop_ownership(&txn, &shop, merchant_id).await?;
    // Re-read under the lock: a cancel committed meanwhile is visible now.
    let order = find_order_or_throw(&txn, order.id).await?;
    ensure_not_cancelled(&order)?;

    match payment.status {
        PaymentStatus::Paid => {
            return Err(AppError::InvalidStateTransition("Payment is already paid".into()));
        }
        PaymentStatus::Refunded => {
            return Err(AppError::InvalidStateTransition(
                "Cannot mark a refunded payment as paid".into(),
            ));
        }
        PaymentStatus::Unpaid | PaymentStatus::Pending => {}
    }

    let payment = move_status(
        &txn,
        &payment,
        &[PaymentStatus::Unpaid, PaymentStatus::Pending],
        PaymentStatus::Paid,
        Some(Utc::now().fixed_offset()),
    )
    .await?;

    txn.commit().await?;
    Ok((payment, order, basket))
}

pub async fn refund_payment(
    state: &AppState,
    user: &AuthUser,
    payment_id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    ensure_admin(user)?;

    let payment = find_payment_or_throw(&state.orm, payment_id).await?;
    if payment.status != PaymentStatus::Paid {
        return Err(AppError::InvalidStateTransition(format!(
            "Only paid payments can be refunded. Current status: {}",
            payment.status
        )));
    }

    let payment = move_status(&state.orm, &payment, &[PaymentStatus::Paid], PaymentStatus::Refunded, None)
        .await?;

    tracing::info!(payment_id = %payment.id, "payment refunded");
    audit::record(
        &state.orm,
        user.user_id,
        "payment_refunded",
        "payments",
        serde_json::json!({ "payment_id": payment.id, "order_id": payment.order_id }),
    )
    .await;

    Ok(ApiResponse::item("Payment refunded", payment.into()))
}

fn ensure_not_cancelled(order: &OrderModel) -> AppResult<()> {
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::InvalidStateTransition(
            "Payments of cancelled orders cannot change".into(),
        ));
    }
    Ok(())
}

async fn find_payment_or_throw<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<PaymentModel> {
    Payments::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Payment"))
}

async fn move_status<C: ConnectionTrait>(
    conn: &C,
    payment: &PaymentModel,
    from: &[PaymentStatus],
    to: PaymentStatus,
    paid_at: Option<sea_orm::prelude::DateTimeWithTimeZone>,
) -> AppResult<PaymentModel> {
    let mut update = Payments::update_many()
        .col_expr(PaymentCol::Status, Expr::value(to))
        .col_expr(PaymentCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()));
    if let Some(paid_at) = paid_at {
        update = update.col_expr(PaymentCol::PaidAt, Expr::value(paid_at));
    }
    let result = update
        .filter(PaymentCol::Id.eq(payment.id))
        .filter(PaymentCol::Status.is_in(from.iter().copied()))
        .exec(conn)
        .await?;

    let updated = find_payment_or_throw(conn, payment.id).await?;
    if result.rows_affected == 0 {
        return Err(AppError::InvalidStateTransition(format!(
            "Payment changed concurrently. Current status: {}",
            updated.status
        )));
    }
    Ok(updated)
}
