use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, Payment};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub basket_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidatePickupRequest {
    pub pickup_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithPayment {
    pub order: Order,
    pub payment: Option<Payment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
