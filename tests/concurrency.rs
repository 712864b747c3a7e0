mod common;

use std::collections::HashSet;

use common::{BasketSeed, create_user, marketplace, reload_basket, spawn_pooled_app};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use surplus_market_api::{
    dto::orders::CreateOrderRequest,
    entity::{
        Orders, Payments,
        baskets::BasketStatus,
        orders::{Column as OrderCol, OrderStatus},
        users::UserRole,
    },
    error::AppError,
    services::order_service,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_oversell() -> anyhow::Result<()> {
    const AVAILABLE: i32 = 10;
    const EXTRA: usize = 10;

    let app = spawn_pooled_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            quantity_total: AVAILABLE,
            quantity_left: AVAILABLE,
            ..Default::default()
        },
    )
    .await?;

    let mut customers = Vec::new();
    for _ in 0..(AVAILABLE as usize + EXTRA) {
        customers.push(create_user(&app.state, UserRole::Customer).await?);
    }

    let mut handles = Vec::new();
    for customer in customers {
        let state = app.state.clone();
        let basket_id = m.basket.id;
        handles.push(tokio::spawn(async move {
            order_service::create_order(
                &state,
                &customer,
                CreateOrderRequest {
                    basket_id,
                    quantity: 1,
                },
            )
            .await
        }));
    }

    let mut codes = HashSet::new();
    let mut shortfalls = 0;
    for handle in handles {
        match handle.await? {
            Ok(resp) => {
                let order = resp.data.expect("order").order;
                assert!(codes.insert(order.pickup_code), "duplicate pickup code");
            }
            Err(AppError::InsufficientInventory { requested: 1, .. }) => shortfalls += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(codes.len(), AVAILABLE as usize);
    assert_eq!(shortfalls, EXTRA);

    let basket = reload_basket(&app.state, m.basket.id).await?;
    assert_eq!(basket.quantity_left, 0);
    assert_eq!(basket.status, BasketStatus::SoldOut);

    let reserved = Orders::find()
        .filter(OrderCol::BasketId.eq(m.basket.id))
        .filter(OrderCol::Status.eq(OrderStatus::Reserved))
        .count(&app.state.orm)
        .await?;
    assert_eq!(reserved, AVAILABLE as u64);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_create_and_cancel_conserve_inventory() -> anyhow::Result<()> {
    let app = spawn_pooled_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            quantity_total: 10,
            quantity_left: 10,
            ..Default::default()
        },
    )
    .await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let state = app.state.clone();
        let customer = create_user(&app.state, UserRole::Customer).await?;
        let basket_id = m.basket.id;
        handles.push(tokio::spawn(async move {
            let order = order_service::create_order(
                &state,
                &customer,
                CreateOrderRequest {
                    basket_id,
                    quantity: 1,
                },
            )
            .await?
            .data
            .expect("order")
            .order;
            order_service::cancel_order(&state, &customer, order.id).await?;
            Ok::<_, AppError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let basket = reload_basket(&app.state, m.basket.id).await?;
    assert_eq!(basket.quantity_left, 10);
    assert_eq!(basket.status, BasketStatus::Published);

    // Every order still has exactly one payment.
    let orders = Orders::find()
        .filter(OrderCol::BasketId.eq(m.basket.id))
        .count(&app.state.orm)
        .await?;
    let payments = Payments::find().count(&app.state.orm).await?;
    assert_eq!(orders, 8);
    assert!(payments >= orders);
    Ok(())
}
