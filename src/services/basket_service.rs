use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
    prelude::DateTimeWithTimeZone,
    sea_query::{Expr, Func, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    db::{self, begin_serializable},
    dto::baskets::{BasketList, CreateBasketRequest, UpdateBasketRequest},
    entity::{
        baskets::{
            ActiveModel as BasketActive, BasketStatus, Column as BasketCol, Entity as Baskets,
            Model as BasketModel,
        },
        orders::{Column as OrderCol, Entity as Orders},
        shops::ShopStatus,
        users::UserRole,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_role},
    models::Basket,
    response::ApiResponse,
    routes::params::{BasketListQuery, Pagination},
    services::shop_service,
    state::AppState,
};

pub async fn find_basket_or_throw<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<BasketModel> {
    Baskets::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Basket"))
}

fn validate_pickup_window(
    start: DateTimeWithTimeZone,
    end: DateTimeWithTimeZone,
    start_must_be_future: bool,
) -> AppResult<()> {
    if start_must_be_future && start <= Utc::now().fixed_offset() {
        return Err(AppError::BadRequest("Pickup start must be in the future".into()));
    }
    if end <= start {
        return Err(AppError::BadRequest("Pickup end must be after pickup start".into()));
    }
    Ok(())
}

fn validate_prices(original: i64, discount: i64) -> AppResult<()> {
    if original <= 0 {
        return Err(AppError::BadRequest("Original price must be greater than 0".into()));
    }
    if discount < 0 {
        return Err(AppError::BadRequest("Discount price cannot be negative".into()));
    }
    if discount > original {
        return Err(AppError::BadRequest(
            "Discount price cannot be greater than original price".into(),
        ));
    }
    Ok(())
}

fn not_in_status(action: &str, expected: BasketStatus, current: BasketStatus) -> AppError {
    AppError::InvalidStateTransition(format!(
        "Only {expected} baskets can be {action}. Current status: {current}"
    ))
}

fn to_db_time(value: DateTime<Utc>) -> DateTimeWithTimeZone {
    value.fixed_offset()
}

pub async fn create_basket(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBasketRequest,
) -> AppResult<ApiResponse<Basket>> {
    ensure_role(user, UserRole::Merchant)?;

    let shop = shop_service::find_shop_or_throw(&state.orm, payload.shop_id).await?;
    shop_service::check_shop_ownership(&state.orm, &shop, user.user_id).await?;
    if shop.status != ShopStatus::Active {
        return Err(AppError::BadRequest("Shop must be active to create baskets".into()));
    }

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".into()));
    }
    let pickup_start = to_db_time(payload.pickup_start);
    let pickup_end = to_db_time(payload.pickup_end);
    validate_pickup_window(pickup_start, pickup_end, true)?;
    validate_prices(payload.price_original, payload.price_discount)?;
    if payload.quantity_total < 1 {
        return Err(AppError::BadRequest("Total quantity must be at least 1".into()));
    }

    let currency = payload
        .currency
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.default_currency.to_string());
    let now = Utc::now().fixed_offset();

    let basket = BasketActive {
        id: Set(Uuid::new_v4()),
        shop_id: Set(shop.id),
        title: Set(title),
        description: Set(payload.description),
        price_original: Set(payload.price_original),
        price_discount: Set(payload.price_discount),
        currency: Set(currency),
        quantity_total: Set(payload.quantity_total),
        quantity_left: Set(payload.quantity_total),
        pickup_start: Set(pickup_start),
        pickup_end: Set(pickup_end),
        status: Set(BasketStatus::Draft),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(basket_id = %basket.id, shop_id = %shop.id, "basket created");
    audit::record(
        &state.orm,
        user.user_id,
        "basket_created",
        "baskets",
        serde_json::json!({ "basket_id": basket.id, "shop_id": shop.id }),
    )
    .await;

    Ok(ApiResponse::item("Basket created", basket.into()))
}

/// Edit a DRAFT basket. A new `quantity_total` moves `quantity_left` by the
/// same amount so units held by existing orders stay accounted for.
pub async fn update_basket(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateBasketRequest,
) -> AppResult<ApiResponse<Basket>> {
    let basket = db::retry_on_conflict("update_basket", || {
        try_update_basket(state, user.user_id, id, &payload)
    })
    .await?;

    audit::record(
        &state.orm,
        user.user_id,
        "basket_updated",
        "baskets",
        serde_json::json!({ "basket_id": basket.id }),
    )
    .await;

    Ok(ApiResponse::item("Basket updated", basket.into()))
}

async fn try_update_basket(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    payload: &UpdateBasketRequest,
) -> AppResult<BasketModel> {
    let txn = begin_serializable(&state.orm).await?;

    let basket = Baskets::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Basket"))?;
    let shop = shop_service::find_shop_or_throw(&txn, basket.shop_id).await?;
    shop_service::check_shop_ownership(&txn, &shop, user_id).await?;
    if basket.status != BasketStatus::Draft {
        return Err(not_in_status("updated", BasketStatus::Draft, basket.status));
    }

    let pickup_start = payload.pickup_start.map(to_db_time).unwrap_or(basket.pickup_start);
    let pickup_end = payload.pickup_end.map(to_db_time).unwrap_or(basket.pickup_end);
    validate_pickup_window(pickup_start, pickup_end, payload.pickup_start.is_some())?;

    let price_original = payload.price_original.unwrap_or(basket.price_original);
    let price_discount = payload.price_discount.unwrap_or(basket.price_discount);
    validate_prices(price_original, price_discount)?;

    let reserved = basket.quantity_total - basket.quantity_left;
    let quantity_total = payload.quantity_total.unwrap_or(basket.quantity_total);
    if quantity_total < 1 {
        return Err(AppError::BadRequest("Total quantity must be at least 1".into()));
    }
    if quantity_total < reserved {
        return Err(AppError::BadRequest(format!(
            "Total quantity cannot be lower than the {reserved} units already reserved"
        )));
    }

    let mut active: BasketActive = basket.clone().into();
    if let Some(title) = payload.title.as_ref().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        active.title = Set(title.to_string());
    }
    if let Some(description) = payload.description.clone() {
        active.description = Set(Some(description));
    }
    if let Some(currency) = payload.currency.as_ref().filter(|c| !c.trim().is_empty()) {
        active.currency = Set(currency.clone());
    }
    active.price_original = Set(price_original);
    active.price_discount = Set(price_discount);
    active.pickup_start = Set(pickup_start);
    active.pickup_end = Set(pickup_end);
    if quantity_total != basket.quantity_total {
        active.quantity_total = Set(quantity_total);
        active.quantity_left = Set(quantity_total - reserved);
    }
    active.updated_at = Set(Utc::now().fixed_offset());
    let basket = active.update(&txn).await?;

    txn.commit().await?;
    Ok(basket)
}

pub async fn publish_basket(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Basket>> {
    let basket = load_owned(state, user, id).await?;
    if basket.status != BasketStatus::Draft {
        return Err(not_in_status("published", BasketStatus::Draft, basket.status));
    }
    if basket.pickup_end <= Utc::now().fixed_offset() {
        return Err(AppError::BadRequest(
            "Cannot publish a basket whose pickup window has ended".into(),
        ));
    }
    if basket.quantity_left == 0 {
        return Err(AppError::BadRequest(
            "Cannot publish a basket with no quantity left".into(),
        ));
    }

    let basket = set_status_from(
        state,
        &basket,
        BasketStatus::Draft,
        BasketStatus::Published,
        "published",
    )
    .await?;
    tracing::info!(basket_id = %basket.id, "basket published");
    audit::record(
        &state.orm,
        user.user_id,
        "basket_published",
        "baskets",
        serde_json::json!({ "basket_id": basket.id }),
    )
    .await;

    Ok(ApiResponse::item("Basket published", basket.into()))
}

pub async fn unpublish_basket(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Basket>> {
    let basket = load_owned(state, user, id).await?;
    if basket.status != BasketStatus::Published {
        return Err(not_in_status("unpublished", BasketStatus::Published, basket.status));
    }

    let basket = set_status_from(
        state,
        &basket,
        BasketStatus::Published,
        BasketStatus::Draft,
        "unpublished",
    )
    .await?;
    tracing::info!(basket_id = %basket.id, "basket unpublished");
    audit::record(
        &state.orm,
        user.user_id,
        "basket_unpublished",
        "baskets",
        serde_json::json!({ "basket_id": basket.id }),
    )
    .await;

    Ok(ApiResponse::item("Basket unpublished", basket.into()))
}

pub async fn delete_basket(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let basket = load_owned(state, user, id).await?;
    if basket.status != BasketStatus::Draft {
        return Err(not_in_status("deleted", BasketStatus::Draft, basket.status));
    }
    let order_count = Orders::find()
        .filter(OrderCol::BasketId.eq(basket.id))
        .count(&state.orm)
        .await?;
    if order_count > 0 {
        return Err(AppError::BadRequest("Cannot delete a basket that has orders".into()));
    }

    let result = Baskets::delete_many()
        .filter(BasketCol::Id.eq(basket.id))
        .filter(BasketCol::Status.eq(BasketStatus::Draft))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        let current = find_basket_or_throw(&state.orm, basket.id).await?;
        return Err(not_in_status("deleted", BasketStatus::Draft, current.status));
    }

    tracing::info!(basket_id = %basket.id, "basket deleted");
    audit::record(
        &state.orm,
        user.user_id,
        "basket_deleted",
        "baskets",
        serde_json::json!({ "basket_id": basket.id }),
    )
    .await;

    Ok(ApiResponse::item(
        "Basket deleted",
        serde_json::json!({ "id": basket.id }),
    ))
}

pub async fn get_basket(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Basket>> {
    let basket = find_basket_or_throw(&state.orm, id).await?;
    Ok(ApiResponse::item("OK", basket.into()))
}

/// Baskets a customer can order right now.
pub async fn list_available_baskets(
    state: &AppState,
    query: BasketListQuery,
) -> AppResult<ApiResponse<BasketList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all()
        .add(BasketCol::Status.eq(BasketStatus::Published))
        .add(BasketCol::QuantityLeft.gt(0))
        .add(BasketCol::PickupEnd.gt(Utc::now().fixed_offset()));

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        condition =
            condition.add(Expr::expr(Func::lower(Expr::col(BasketCol::Title))).like(pattern));
    }
    if let Some(shop_id) = query.shop_id {
        condition = condition.add(BasketCol::ShopId.eq(shop_id));
    }

    let finder = Baskets::find()
        .filter(condition)
        .order_by_asc(BasketCol::PickupStart);
    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Basket::from)
        .collect();

    Ok(ApiResponse::page("Baskets", BasketList { items }, page, limit, total))
}

pub async fn list_shop_baskets(
    state: &AppState,
    user: &AuthUser,
    shop_id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<BasketList>> {
    let shop = shop_service::find_shop_or_throw(&state.orm, shop_id).await?;
    shop_service::check_shop_ownership(&state.orm, &shop, user.user_id).await?;

    let (page, limit, offset) = pagination.normalize();
    let finder = Baskets::find()
        .filter(BasketCol::ShopId.eq(shop.id))
        .order_by_desc(BasketCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Basket::from)
        .collect();

    Ok(ApiResponse::page("Baskets", BasketList { items }, page, limit, total))
}

async fn load_owned(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<BasketModel> {
    let basket = find_basket_or_throw(&state.orm, id).await?;
    let shop = shop_service::find_shop_or_throw(&state.orm, basket.shop_id).await?;
    shop_service::check_shop_ownership(&state.orm, &shop, user.user_id).await?;
    Ok(basket)
}

/// Status change that only applies while the basket is still in `from`.
async fn set_status_from(
    state: &AppState,
    basket: &BasketModel,
    from: BasketStatus,
    to: BasketStatus,
    action: &str,
) -> AppResult<BasketModel> {
    let mut update = Baskets::update_many()
        .col_expr(BasketCol::Status, Expr::value(to))
        .col_expr(BasketCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(BasketCol::Id.eq(basket.id))
        .filter(BasketCol::Status.eq(from));
    // A published basket always has something left to sell.
    if to == BasketStatus::Published {
        update = update.filter(BasketCol::QuantityLeft.gt(0));
    }
    let result = update.exec(&state.orm).await?;

    let updated = find_basket_or_throw(&state.orm, basket.id).await?;
    if result.rows_affected == 0 {
        if to == BasketStatus::Published && updated.status == from && updated.quantity_left == 0 {
            return Err(AppError::BadRequest(
                "Cannot publish a basket with no quantity left".into(),
            ));
        }
        return Err(not_in_status(action, from, updated.status));
    }
    Ok(updated)
}
