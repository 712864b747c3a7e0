use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    baskets::{self, BasketStatus},
    notifications::{self, NotificationKind},
    orders::{self, OrderStatus},
    payments::{self, PaymentProvider, PaymentStatus},
    shops::{self, ShopStatus},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Shop {
    pub id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub status: ShopStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Basket {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price_original: i64,
    pub price_discount: i64,
    pub currency: String,
    pub quantity_total: i32,
    pub quantity_left: i32,
    pub pickup_start: DateTime<Utc>,
    pub pickup_end: DateTime<Utc>,
    pub status: BasketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub basket_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
    pub status: OrderStatus,
    pub pickup_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<shops::Model> for Shop {
    fn from(model: shops::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            city: model.city,
            status: model.status,
            created_by: model.created_by,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<baskets::Model> for Basket {
    fn from(model: baskets::Model) -> Self {
        Self {
            id: model.id,
            shop_id: model.shop_id,
            title: model.title,
            description: model.description,
            price_original: model.price_original,
            price_discount: model.price_discount,
            currency: model.currency,
            quantity_total: model.quantity_total,
            quantity_left: model.quantity_left,
            pickup_start: model.pickup_start.with_timezone(&Utc),
            pickup_end: model.pickup_end.with_timezone(&Utc),
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            basket_id: model.basket_id,
            quantity: model.quantity,
            unit_price: model.unit_price,
            total_price: model.total_price,
            status: model.status,
            pickup_code: model.pickup_code,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<payments::Model> for Payment {
    fn from(model: payments::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            provider: model.provider,
            status: model.status,
            amount: model.amount,
            currency: model.currency,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<notifications::Model> for Notification {
    fn from(model: notifications::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            body: model.body,
            kind: model.kind,
            is_read: model.is_read,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
