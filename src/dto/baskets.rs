use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Basket;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBasketRequest {
    pub shop_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price_original: i64,
    pub price_discount: i64,
    pub currency: Option<String>,
    pub quantity_total: i32,
    pub pickup_start: DateTime<Utc>,
    pub pickup_end: DateTime<Utc>,
}

/// Absent fields keep their current value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateBasketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_original: Option<i64>,
    pub price_discount: Option<i64>,
    pub currency: Option<String>,
    pub quantity_total: Option<i32>,
    pub pickup_start: Option<DateTime<Utc>>,
    pub pickup_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BasketList {
    pub items: Vec<Basket>,
}
