//! Order reservation state machine.
//!
//! ```text
//! RESERVED ──► PICKED_UP
//!     │──────► CANCELLED   (inventory restored)
//!     └──────► NO_SHOW     (inventory forfeited)
//! ```
//!
//! Every transition runs as one serializable unit of work, re-run from
//! scratch on a storage conflict. Notifications and audit entries are only
//! emitted once the transaction has committed.

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
    prelude::DateTimeWithTimeZone,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    db::{self, begin_serializable},
    dto::orders::{CreateOrderRequest, OrderList, OrderWithPayment},
    entity::{
        baskets::{BasketStatus, Column as BasketCol, Entity as Baskets, Model as BasketModel},
        notifications::NotificationKind,
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
            OrderStatus,
        },
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
            Model as PaymentModel, PaymentProvider, PaymentStatus,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::params::{OrderListQuery, SortOrder},
    services::{basket_service::find_basket_or_throw, inventory, pickup_code, shop_service},
    state::AppState,
};

/// Eligibility checks for a reservation, evaluated in a fixed order so the
/// first failing rule is the one reported.
///
/// SOLD_OUT only mirrors `quantity_left == 0`, so ordering from a sold-out
/// basket is reported as an inventory shortfall rather than unavailability.
pub fn check_orderable(
    basket: &BasketModel,
    quantity: i32,
    max_per_order: i32,
    now: DateTimeWithTimeZone,
) -> AppResult<()> {
    match basket.status {
        BasketStatus::Published => {}
        BasketStatus::SoldOut => {
            return Err(AppError::InsufficientInventory {
                requested: quantity,
                available: basket.quantity_left,
            });
        }
        status => return Err(AppError::BasketNotAvailable { status }),
    }
    if basket.pickup_end <= now {
        return Err(AppError::PickupWindowExpired);
    }
    if quantity > basket.quantity_left {
        return Err(AppError::InsufficientInventory {
            requested: quantity,
            available: basket.quantity_left,
        });
    }
    if quantity > max_per_order {
        return Err(AppError::QuantityLimitExceeded { max: max_per_order });
    }
    Ok(())
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithPayment>> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest("quantity must be at least 1".into()));
    }

    let (order, payment, basket) = db::retry_on_conflict("create_order", || {
        try_create_order(state, user.user_id, payload.basket_id, payload.quantity)
    })
    .await?;

    tracing::info!(
        order_id = %order.id,
        basket_id = %basket.id,
        quantity = order.quantity,
        quantity_left = basket.quantity_left,
        "order reserved"
    );

    state.notifier.notify(
        order.user_id,
        "Order confirmed",
        format!(
            "Your order for {} is reserved. Pickup code: {}",
            basket.title, order.pickup_code
        ),
        NotificationKind::OrderConfirmed,
    );
    audit::record(
        &state.orm,
        user.user_id,
        "order_created",
        "orders",
        serde_json::json!({ "order_id": order.id, "basket_id": basket.id, "quantity": order.quantity }),
    )
    .await;

    Ok(ApiResponse::item(
        "Order created",
        OrderWithPayment {
            order: order.into(),
            payment: Some(payment.into()),
        },
    ))
}

async fn try_create_order(
    state: &AppState,
    customer_id: Uuid,
    basket_id: Uuid,
    quantity: i32,
) -> AppResult<(OrderModel, PaymentModel, BasketModel)> {
    let txn = begin_serializable(&state.orm).await?;

    shop_service::find_user_or_throw(&txn, customer_id).await?;
    let basket = Baskets::find_by_id(basket_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Basket"))?;

    let now = Utc::now().fixed_offset();
    check_orderable(&basket, quantity, state.settings.max_quantity_per_order, now)?;

    let unit_price = basket.price_discount;
    let total_price = unit_price * i64::from(quantity);
    let code = pickup_code::generate_unique(&txn, state.settings.pickup_code_length).await?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(customer_id),
        basket_id: Set(basket.id),
        quantity: Set(quantity),
        unit_price: Set(unit_price),
        total_price: Set(total_price),
        status: Set(OrderStatus::Reserved),
        pickup_code: Set(code),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let basket = inventory::decrement_quantity(&txn, &basket, quantity).await?;

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        provider: Set(PaymentProvider::Cash),
        status: Set(PaymentStatus::Unpaid),
        amount: Set(total_price),
        currency: Set(basket.currency.clone()),
        paid_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    Ok((order, payment, basket))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<OrderWithPayment>> {
    let (order, payment, basket) = db::retry_on_conflict("cancel_order", || {
        try_cancel_order(state, user.user_id, order_id)
    })
    .await?;

    tracing::info!(
        order_id = %order.id,
        basket_id = %basket.id,
        restored = order.quantity,
        quantity_left = basket.quantity_left,
        "order cancelled"
    );

    state.notifier.notify(
        order.user_id,
        "Order cancelled",
        format!("Your order for {} has been cancelled.", basket.title),
        NotificationKind::OrderCancelled,
    );
    audit::record(
        &state.orm,
        user.user_id,
        "order_cancelled",
        "orders",
        serde_json::json!({ "order_id": order.id, "basket_id": basket.id }),
    )
    .await;

    Ok(ApiResponse::item(
        "Order cancelled",
        OrderWithPayment {
            order: order.into(),
            payment: payment.map(Into::into),
        },
    ))
}

async fn try_cancel_order(
    state: &AppState,
    requester_id: Uuid,
    order_id: Uuid,
) -> AppResult<(OrderModel, Option<PaymentModel>, BasketModel)> {
    let txn = begin_serializable(&state.orm).await?;

    let order = find_order_or_throw(&txn, order_id).await?;
    if order.user_id != requester_id {
        return Err(AppError::forbidden("You can only cancel your own orders"));
    }
    if order.status != OrderStatus::Reserved {
        return Err(AppError::not_reserved("cancelled", order.status));
    }

    let basket = Baskets::find_by_id(order.basket_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Basket"))?;

    let cutoff_minutes = state.settings.cancel_cutoff_minutes;
    let now = Utc::now().fixed_offset();
    if now >= basket.pickup_start - Duration::minutes(cutoff_minutes) {
        return Err(AppError::CancellationWindowClosed { cutoff_minutes });
    }

    let order = transition(&txn, &order, OrderStatus::Cancelled, "cancelled").await?;
    let basket = inventory::increment_quantity(&txn, &basket, order.quantity).await?;

    let payment = match find_payment(&txn, order.id).await? {
        Some(payment) if payment.status == PaymentStatus::Paid => {
            let mut active: PaymentActive = payment.into();
            active.status = Set(PaymentStatus::Refunded);
            active.updated_at = Set(now);
            Some(active.update(&txn).await?)
        }
        other => other,
    };

    txn.commit().await?;
    Ok((order, payment, basket))
}

pub async fn validate_pickup(
    state: &AppState,
    user: &AuthUser,
    code: &str,
) -> AppResult<ApiResponse<OrderWithPayment>> {
    let code = pickup_code::normalize(code);
    let (order, payment, basket) = db::retry_on_conflict("validate_pickup", || {
        try_validate_pickup(state, user.user_id, &code)
    })
    .await?;

    tracing::info!(order_id = %order.id, basket_id = %basket.id, "order picked up");

    state.notifier.notify(
        order.user_id,
        "Order picked up",
        format!("Your order for {} has been collected. Enjoy!", basket.title),
        NotificationKind::OrderPickedUp,
    );
    audit::record(
        &state.orm,
        user.user_id,
        "order_picked_up",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::item(
        "Pickup validated",
        OrderWithPayment {
            order: order.into(),
            payment: payment.map(Into::into),
        },
    ))
}

async fn try_validate_pickup(
    state: &AppState,
    merchant_id: Uuid,
    code: &str,
) -> AppResult<(OrderModel, Option<PaymentModel>, BasketModel)> {
    let txn = begin_serializable(&state.orm).await?;

    let order = Orders::find()
        .filter(OrderCol::PickupCode.eq(code))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;
    let basket = find_basket_or_throw(&txn, order.basket_id).await?;
    let shop = shop_service::find_shop_or_throw(&txn, basket.shop_id).await?;
    shop_service::check_shop_ownership(&txn, &shop, merchant_id).await?;

    if order.status != OrderStatus::Reserved {
        return Err(AppError::not_reserved("picked up", order.status));
    }

    let order = transition(&txn, &order, OrderStatus::PickedUp, "picked up").await?;

    let now = Utc::now().fixed_offset();
    let payment = match find_payment(&txn, order.id).await? {
        Some(payment)
            if payment.provider == PaymentProvider::Cash && payment.status != PaymentStatus::Paid =>
        {
            let mut active: PaymentActive = payment.into();
            active.status = Set(PaymentStatus::Paid);
            active.paid_at = Set(Some(now));
            active.updated_at = Set(now);
            Some(active.update(&txn).await?)
        }
        other => other,
    };

    txn.commit().await?;
    Ok((order, payment, basket))
}

pub async fn mark_as_no_show(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<OrderWithPayment>> {
    let (order, payment) = db::retry_on_conflict("mark_as_no_show", || {
        try_mark_as_no_show(state, user.user_id, order_id)
    })
    .await?;

    tracing::info!(order_id = %order.id, forfeited = order.quantity, "order marked as no-show");
    audit::record(
        &state.orm,
        user.user_id,
        "order_no_show",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::item(
        "Order marked as no-show",
        OrderWithPayment {
            order: order.into(),
            payment: payment.map(Into::into),
        },
    ))
}

async fn try_mark_as_no_show(
    state: &AppState,
    merchant_id: Uuid,
    order_id: Uuid,
) -> AppResult<(OrderModel, Option<PaymentModel>)> {
    let txn = begin_serializable(&state.orm).await?;

    let order = find_order_or_throw(&txn, order_id).await?;
    let basket = find_basket_or_throw(&txn, order.basket_id).await?;
    let shop = shop_service::find_shop_or_throw(&txn, basket.shop_id).await?;
    shop_service::check_shop_ownership(&txn, &shop, merchant_id).await?;

    if order.status != OrderStatus::Reserved {
        return Err(AppError::not_reserved("marked as no-show", order.status));
    }
    if Utc::now().fixed_offset() < basket.pickup_end {
        return Err(AppError::TooEarly(
            "Cannot mark as no-show before the pickup window ends".into(),
        ));
    }

    let order = transition(&txn, &order, OrderStatus::NoShow, "marked as no-show").await?;
    let payment = find_payment(&txn, order.id).await?;

    txn.commit().await?;
    Ok((order, payment))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithPayment>> {
    let order = find_order_or_throw(&state.orm, id).await?;
    ensure_order_access(&state.orm, &order, user).await?;
    let payment = find_payment(&state.orm, order.id).await?;

    Ok(ApiResponse::item(
        "OK",
        OrderWithPayment {
            order: order.into(),
            payment: payment.map(Into::into),
        },
    ))
}

/// Lookup used at the counter. Input is normalized, so codes match
/// regardless of case or surrounding whitespace.
pub async fn get_order_by_pickup_code(
    state: &AppState,
    user: &AuthUser,
    code: &str,
) -> AppResult<ApiResponse<OrderWithPayment>> {
    let order = Orders::find()
        .filter(OrderCol::PickupCode.eq(pickup_code::normalize(code)))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;
    ensure_order_access(&state.orm, &order, user).await?;
    let payment = find_payment(&state.orm, order.id).await?;

    Ok(ApiResponse::item(
        "OK",
        OrderWithPayment {
            order: order.into(),
            payment: payment.map(Into::into),
        },
    ))
}

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }
    list_orders(state, Orders::find().filter(condition), query).await
}

pub async fn list_shop_orders(
    state: &AppState,
    user: &AuthUser,
    shop_id: Uuid,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let shop = shop_service::find_shop_or_throw(&state.orm, shop_id).await?;
    shop_service::check_shop_ownership(&state.orm, &shop, user.user_id).await?;

    let mut condition = Condition::all().add(BasketCol::ShopId.eq(shop.id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }
    let finder = Orders::find().inner_join(Baskets).filter(condition);
    list_orders(state, finder, query).await
}

async fn list_orders(
    state: &AppState,
    finder: sea_orm::Select<Orders>,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok(ApiResponse::page("Ok", OrderList { items }, page, limit, total))
}

/// Move a RESERVED order to `next`. The update only matches while the row
/// is still RESERVED, so a racing transition cannot be applied twice.
async fn transition<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    next: OrderStatus,
    action: &str,
) -> AppResult<OrderModel> {
    let result = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(next))
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(OrderCol::Id.eq(order.id))
        .filter(OrderCol::Status.eq(OrderStatus::Reserved))
        .exec(conn)
        .await?;

    let updated = find_order_or_throw(conn, order.id).await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_reserved(action, updated.status));
    }
    Ok(updated)
}

/// Customers see their own orders; merchants see orders on their shops.
pub(crate) async fn ensure_order_access<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    user: &AuthUser,
) -> AppResult<()> {
    if order.user_id == user.user_id || user.is_admin() {
        return Ok(());
    }
    let basket = find_basket_or_throw(conn, order.basket_id).await?;
    let shop = shop_service::find_shop_or_throw(conn, basket.shop_id).await?;
    if shop.created_by == user.user_id {
        return Ok(());
    }
    Err(AppError::forbidden("You do not have access to this order"))
}

pub(crate) async fn find_order_or_throw<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))
}

async fn find_payment<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Option<PaymentModel>> {
    Ok(Payments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .one(conn)
        .await?)
}
