//! Merchant-facing endpoints: basket lifecycle and the pickup counter.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::{
        baskets::{BasketList, CreateBasketRequest, UpdateBasketRequest},
        orders::{OrderList, OrderWithPayment, ValidatePickupRequest},
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Basket,
    response::ApiResponse,
    routes::params::{OrderListQuery, Pagination},
    services::{basket_service, order_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/baskets", post(create_basket))
        .route("/baskets/{id}", put(update_basket).delete(delete_basket))
        .route("/baskets/{id}/publish", post(publish_basket))
        .route("/baskets/{id}/unpublish", post(unpublish_basket))
        .route("/shops/{shop_id}/baskets", get(list_shop_baskets))
        .route("/shops/{shop_id}/orders", get(list_shop_orders))
        .route("/orders/validate-pickup", post(validate_pickup))
        .route("/orders/pickup-code/{code}", get(get_order_by_pickup_code))
        .route("/orders/{id}/no-show", post(mark_as_no_show))
}

#[utoipa::path(
    post,
    path = "/api/merchant/baskets",
    request_body = CreateBasketRequest,
    responses(
        (status = 201, description = "Basket created as draft", body = ApiResponse<Basket>),
        (status = 403, description = "Not the shop owner")
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn create_basket(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBasketRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Basket>>)> {
    let resp = basket_service::create_basket(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/merchant/baskets/{id}",
    params(("id" = Uuid, Path, description = "Basket id")),
    request_body = UpdateBasketRequest,
    responses(
        (status = 200, description = "Basket updated", body = ApiResponse<Basket>),
        (status = 400, description = "Basket is not a draft")
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn update_basket(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBasketRequest>,
) -> AppResult<Json<ApiResponse<Basket>>> {
    let resp = basket_service::update_basket(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/merchant/baskets/{id}",
    params(("id" = Uuid, Path, description = "Basket id")),
    responses(
        (status = 200, description = "Basket deleted"),
        (status = 400, description = "Basket is not a draft or has orders")
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn delete_basket(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = basket_service::delete_basket(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/merchant/baskets/{id}/publish",
    params(("id" = Uuid, Path, description = "Basket id")),
    responses(
        (status = 200, description = "Basket published", body = ApiResponse<Basket>)
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn publish_basket(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Basket>>> {
    let resp = basket_service::publish_basket(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/merchant/baskets/{id}/unpublish",
    params(("id" = Uuid, Path, description = "Basket id")),
    responses(
        (status = 200, description = "Basket back to draft", body = ApiResponse<Basket>)
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn unpublish_basket(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Basket>>> {
    let resp = basket_service::unpublish_basket(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/merchant/shops/{shop_id}/baskets",
    params(("shop_id" = Uuid, Path, description = "Shop id"), Pagination),
    responses(
        (status = 200, description = "All baskets of the shop", body = ApiResponse<BasketList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn list_shop_baskets(
    State(state): State<AppState>,
    user: AuthUser,
    Path(shop_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<BasketList>>> {
    let resp = basket_service::list_shop_baskets(&state, &user, shop_id, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/merchant/shops/{shop_id}/orders",
    params(("shop_id" = Uuid, Path, description = "Shop id"), OrderListQuery),
    responses(
        (status = 200, description = "Orders placed on the shop's baskets", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn list_shop_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(shop_id): Path<Uuid>,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_shop_orders(&state, &user, shop_id, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/merchant/orders/validate-pickup",
    request_body = ValidatePickupRequest,
    responses(
        (status = 200, description = "Order picked up", body = ApiResponse<OrderWithPayment>),
        (status = 400, description = "Order is not reserved"),
        (status = 404, description = "Unknown pickup code")
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn validate_pickup(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ValidatePickupRequest>,
) -> AppResult<Json<ApiResponse<OrderWithPayment>>> {
    let resp = order_service::validate_pickup(&state, &user, &payload.pickup_code).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/merchant/orders/pickup-code/{code}",
    params(("code" = String, Path, description = "Pickup code, any case")),
    responses(
        (status = 200, description = "Order for the code", body = ApiResponse<OrderWithPayment>),
        (status = 404, description = "Unknown pickup code")
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn get_order_by_pickup_code(
    State(state): State<AppState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> AppResult<Json<ApiResponse<OrderWithPayment>>> {
    let resp = order_service::get_order_by_pickup_code(&state, &user, &code).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/merchant/orders/{id}/no-show",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order marked as no-show", body = ApiResponse<OrderWithPayment>),
        (status = 400, description = "Pickup window still open or order not reserved")
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn mark_as_no_show(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithPayment>>> {
    let resp = order_service::mark_as_no_show(&state, &user, id).await?;
    Ok(Json(resp))
}
