use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::payments::UpdatePaymentProviderRequest,
    error::AppResult,
    middleware::auth::AuthUser,
    models::Payment,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/order/{order_id}", get(get_payment_by_order))
        .route("/{id}/provider", put(update_payment_provider))
        .route("/{id}/pending", post(mark_as_pending))
        .route("/{id}/mark-paid", post(mark_as_paid))
        .route("/{id}/refund", post(refund_payment))
}

#[utoipa::path(
    get,
    path = "/api/payments/order/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payment of the order", body = ApiResponse<Payment>)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment_by_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::get_payment_by_order(&state, &user, order_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/payments/{id}/provider",
    params(("id" = Uuid, Path, description = "Payment id")),
    request_body = UpdatePaymentProviderRequest,
    responses(
        (status = 200, description = "Payment provider updated", body = ApiResponse<Payment>),
        (status = 400, description = "Payment is no longer unpaid"),
        (status = 403, description = "Not the order owner")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn update_payment_provider(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePaymentProviderRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp =
        payment_service::update_payment_provider(&state, &user, id, payload.provider).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/{id}/pending",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Payment marked as pending", body = ApiResponse<Payment>),
        (status = 400, description = "Payment is no longer unpaid")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn mark_as_pending(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::mark_as_pending(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/{id}/mark-paid",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Payment marked as paid", body = ApiResponse<Payment>),
        (status = 400, description = "Already paid, refunded or order cancelled")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn mark_as_paid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::mark_as_paid(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/{id}/refund",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Payment refunded", body = ApiResponse<Payment>),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::refund_payment(&state, &user, id).await?;
    Ok(Json(resp))
}
