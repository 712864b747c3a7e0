use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::baskets::BasketList,
    error::AppResult,
    models::Basket,
    response::ApiResponse,
    routes::params::BasketListQuery,
    services::basket_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_available_baskets))
        .route("/{id}", get(get_basket))
}

#[utoipa::path(
    get,
    path = "/api/baskets",
    params(BasketListQuery),
    responses(
        (status = 200, description = "Baskets open for reservation", body = ApiResponse<BasketList>)
    ),
    tag = "Baskets"
)]
pub async fn list_available_baskets(
    State(state): State<AppState>,
    Query(query): Query<BasketListQuery>,
) -> AppResult<Json<ApiResponse<BasketList>>> {
    let resp = basket_service::list_available_baskets(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/baskets/{id}",
    params(("id" = Uuid, Path, description = "Basket id")),
    responses(
        (status = 200, description = "Basket", body = ApiResponse<Basket>),
        (status = 404, description = "Basket not found")
    ),
    tag = "Baskets"
)]
pub async fn get_basket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Basket>>> {
    let resp = basket_service::get_basket(&state, id).await?;
    Ok(Json(resp))
}
