#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use surplus_market_api::{
    config::OrderSettings,
    db::{create_orm_conn, run_migrations},
    entity::{
        Baskets,
        baskets::{ActiveModel as BasketActive, BasketStatus, Model as BasketModel},
        shops::{ActiveModel as ShopActive, Model as ShopModel, ShopStatus},
        users::{ActiveModel as UserActive, UserRole},
    },
    middleware::auth::AuthUser,
    services::notification_service::{NewNotification, Notifier},
    state::AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub struct TestApp {
    pub state: AppState,
    pub notifications: UnboundedReceiver<NewNotification>,
    /// Holds a file-backed database until the test ends.
    _db_dir: Option<TempDir>,
}

impl TestApp {
    /// Everything queued on the notifier so far.
    pub fn drain_notifications(&mut self) -> Vec<NewNotification> {
        let mut out = Vec::new();
        while let Ok(message) = self.notifications.try_recv() {
            out.push(message);
        }
        out
    }
}

/// Fresh state backed by `TEST_DATABASE_URL`, or a private in-memory SQLite
/// database when it is unset.
pub async fn spawn_app() -> anyhow::Result<TestApp> {
    let database_url =
        std::env::var("TEST_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    spawn_app_at(&database_url, None).await
}

/// Like [`spawn_app`] but falls back to a SQLite file in a temporary
/// directory, so the pool holds several connections and transactions
/// really overlap.
pub async fn spawn_pooled_app() -> anyhow::Result<TestApp> {
    if let Ok(database_url) = std::env::var("TEST_DATABASE_URL") {
        return spawn_app_at(&database_url, None).await;
    }
    let dir = tempfile::tempdir()?;
    let database_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("market.db").display()
    );
    spawn_app_at(&database_url, Some(dir)).await
}

async fn spawn_app_at(database_url: &str, db_dir: Option<TempDir>) -> anyhow::Result<TestApp> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    let (notifier, notifications) = Notifier::channel();
    let state = AppState {
        orm,
        settings: Arc::new(OrderSettings::default()),
        default_currency: Arc::from("MRU"),
        notifier,
    };
    Ok(TestApp {
        state,
        notifications,
        _db_dir: db_dir,
    })
}

pub async fn create_user(state: &AppState, role: UserRole) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    let now = Utc::now().fixed_offset();
    UserActive {
        id: Set(id),
        full_name: Set(format!("{role} {}", &id.simple().to_string()[..6])),
        phone: Set(format!("+{}", &id.simple().to_string()[..14])),
        email: Set(None),
        role: Set(role),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser { user_id: id, role })
}

pub async fn create_shop(
    state: &AppState,
    owner: &AuthUser,
    status: ShopStatus,
) -> anyhow::Result<ShopModel> {
    let now = Utc::now().fixed_offset();
    let shop = ShopActive {
        id: Set(Uuid::new_v4()),
        name: Set("Corner Bakery".into()),
        city: Set(Some("Nouakchott".into())),
        status: Set(status),
        created_by: Set(owner.user_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.orm)
    .await?;
    Ok(shop)
}

/// Shape of a basket inserted straight into storage, bypassing the
/// lifecycle checks so tests can start from any state.
pub struct BasketSeed {
    pub quantity_total: i32,
    pub quantity_left: i32,
    pub price_discount: i64,
    pub status: BasketStatus,
    pub starts_in: Duration,
    pub ends_in: Duration,
}

impl Default for BasketSeed {
    fn default() -> Self {
        Self {
            quantity_total: 10,
            quantity_left: 10,
            price_discount: 2500,
            status: BasketStatus::Published,
            starts_in: Duration::hours(2),
            ends_in: Duration::hours(6),
        }
    }
}

pub async fn insert_basket(
    state: &AppState,
    shop: &ShopModel,
    seed: BasketSeed,
) -> anyhow::Result<BasketModel> {
    let now = Utc::now().fixed_offset();
    let basket = BasketActive {
        id: Set(Uuid::new_v4()),
        shop_id: Set(shop.id),
        title: Set("Surprise bag".into()),
        description: Set(None),
        price_original: Set(seed.price_discount * 2),
        price_discount: Set(seed.price_discount),
        currency: Set("MRU".into()),
        quantity_total: Set(seed.quantity_total),
        quantity_left: Set(seed.quantity_left),
        pickup_start: Set(now + seed.starts_in),
        pickup_end: Set(now + seed.ends_in),
        status: Set(seed.status),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.orm)
    .await?;
    Ok(basket)
}

pub async fn reload_basket(state: &AppState, id: Uuid) -> anyhow::Result<BasketModel> {
    Baskets::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("basket {id} vanished"))
}

/// A merchant, their active shop, a customer and one published basket.
pub struct Marketplace {
    pub merchant: AuthUser,
    pub customer: AuthUser,
    pub shop: ShopModel,
    pub basket: BasketModel,
}

pub async fn marketplace(state: &AppState, seed: BasketSeed) -> anyhow::Result<Marketplace> {
    let merchant = create_user(state, UserRole::Merchant).await?;
    let customer = create_user(state, UserRole::Customer).await?;
    let shop = create_shop(state, &merchant, ShopStatus::Active).await?;
    let basket = insert_basket(state, &shop, seed).await?;
    Ok(Marketplace {
        merchant,
        customer,
        shop,
        basket,
    })
}
