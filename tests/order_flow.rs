mod common;

use chrono::{Duration, Utc};
use common::{BasketSeed, marketplace, reload_basket, spawn_app};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, sea_query::Expr};
use surplus_market_api::{
    dto::orders::CreateOrderRequest,
    entity::{
        Baskets, Orders,
        baskets::{BasketStatus, Column as BasketCol},
        notifications::NotificationKind,
        orders::{Column as OrderCol, OrderStatus},
        payments::{PaymentProvider, PaymentStatus},
        users::UserRole,
    },
    error::AppError,
    routes::params::OrderListQuery,
    services::{order_service, payment_service, pickup_code::PICKUP_CODE_ALPHABET},
};
use uuid::Uuid;

fn order_for(basket_id: Uuid, quantity: i32) -> CreateOrderRequest {
    CreateOrderRequest {
        basket_id,
        quantity,
    }
}

#[tokio::test]
async fn reserving_snapshots_price_and_decrements_inventory() -> anyhow::Result<()> {
    let mut app = spawn_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            quantity_total: 10,
            quantity_left: 5,
            price_discount: 2500,
            ..Default::default()
        },
    )
    .await?;

    let resp = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1)).await?;
    let created = resp.data.expect("order data");
    let order = created.order;
    assert_eq!(order.status, OrderStatus::Reserved);
    assert_eq!(order.unit_price, 2500);
    assert_eq!(order.total_price, 2500);
    assert_eq!(order.pickup_code.len(), 6);
    assert!(order.pickup_code.bytes().all(|b| PICKUP_CODE_ALPHABET.contains(&b)));

    let payment = created.payment.expect("payment created with order");
    assert_eq!(payment.status, PaymentStatus::Unpaid);
    assert_eq!(payment.provider, PaymentProvider::Cash);
    assert_eq!(payment.amount, 2500);
    assert_eq!(payment.currency, "MRU");

    let basket = reload_basket(&app.state, m.basket.id).await?;
    assert_eq!(basket.quantity_left, 4);
    assert_eq!(basket.status, BasketStatus::Published);

    // A later price change does not touch the reservation.
    Baskets::update_many()
        .col_expr(BasketCol::PriceDiscount, Expr::value(100_i64))
        .filter(BasketCol::Id.eq(m.basket.id))
        .exec(&app.state.orm)
        .await?;
    let fetched = order_service::get_order(&app.state, &m.customer, order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(fetched.order.unit_price, 2500);

    let kinds: Vec<_> = app.drain_notifications().into_iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NotificationKind::OrderConfirmed]);
    Ok(())
}

#[tokio::test]
async fn taking_the_last_unit_sells_the_basket_out() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            quantity_left: 1,
            ..Default::default()
        },
    )
    .await?;

    order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1)).await?;
    let basket = reload_basket(&app.state, m.basket.id).await?;
    assert_eq!(basket.quantity_left, 0);
    assert_eq!(basket.status, BasketStatus::SoldOut);

    let err = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientInventory {
            requested: 1,
            available: 0
        }
    ));
    Ok(())
}

#[tokio::test]
async fn eligibility_rules_report_the_first_failure() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            quantity_total: 10,
            quantity_left: 3,
            ..Default::default()
        },
    )
    .await?;

    // More than available and more than the per-order cap: inventory wins.
    let err = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 8))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientInventory {
            requested: 8,
            available: 3
        }
    ));

    let roomy = common::insert_basket(&app.state, &m.shop, BasketSeed::default()).await?;
    let err = order_service::create_order(&app.state, &m.customer, order_for(roomy.id, 6))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuantityLimitExceeded { max: 5 }));

    let draft = common::insert_basket(
        &app.state,
        &m.shop,
        BasketSeed {
            status: BasketStatus::Draft,
            ..Default::default()
        },
    )
    .await?;
    let err = order_service::create_order(&app.state, &m.customer, order_for(draft.id, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BasketNotAvailable { status: BasketStatus::Draft }));

    let closed = common::insert_basket(
        &app.state,
        &m.shop,
        BasketSeed {
            starts_in: Duration::hours(-3),
            ends_in: Duration::hours(-1),
            ..Default::default()
        },
    )
    .await?;
    let err = order_service::create_order(&app.state, &m.customer, order_for(closed.id, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PickupWindowExpired));

    let err = order_service::create_order(&app.state, &m.customer, order_for(Uuid::new_v4(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Nothing was taken by the rejected attempts.
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 3);
    assert_eq!(reload_basket(&app.state, roomy.id).await?.quantity_left, 10);
    Ok(())
}

#[tokio::test]
async fn create_then_cancel_restores_inventory_every_time() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            quantity_total: 10,
            quantity_left: 7,
            ..Default::default()
        },
    )
    .await?;

    for _ in 0..5 {
        let order = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 3))
            .await?
            .data
            .expect("order")
            .order;
        assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 4);

        let cancelled = order_service::cancel_order(&app.state, &m.customer, order.id)
            .await?
            .data
            .expect("order");
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 7);
    }
    Ok(())
}

#[tokio::test]
async fn cancelling_the_last_unit_republishes_the_basket() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            quantity_left: 2,
            ..Default::default()
        },
    )
    .await?;

    let order = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 2))
        .await?
        .data
        .expect("order")
        .order;
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.status, BasketStatus::SoldOut);

    order_service::cancel_order(&app.state, &m.customer, order.id).await?;
    let basket = reload_basket(&app.state, m.basket.id).await?;
    assert_eq!(basket.quantity_left, 2);
    assert_eq!(basket.status, BasketStatus::Published);
    Ok(())
}

#[tokio::test]
async fn second_cancel_is_rejected_and_restores_nothing() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(&app.state, BasketSeed::default()).await?;

    let order = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 2))
        .await?
        .data
        .expect("order")
        .order;
    order_service::cancel_order(&app.state, &m.customer, order.id).await?;
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 10);

    let err = order_service::cancel_order(&app.state, &m.customer, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
    assert!(err.to_string().contains("CANCELLED"));
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 10);
    Ok(())
}

#[tokio::test]
async fn only_the_customer_can_cancel() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(&app.state, BasketSeed::default()).await?;
    let stranger = common::create_user(&app.state, UserRole::Customer).await?;

    let order = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1))
        .await?
        .data
        .expect("order")
        .order;

    let err = order_service::cancel_order(&app.state, &stranger, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 9);
    Ok(())
}

#[tokio::test]
async fn cancel_is_refused_inside_the_cutoff() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            starts_in: Duration::minutes(10),
            ends_in: Duration::hours(2),
            ..Default::default()
        },
    )
    .await?;

    let order = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1))
        .await?
        .data
        .expect("order")
        .order;

    let err = order_service::cancel_order(&app.state, &m.customer, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CancellationWindowClosed { cutoff_minutes: 30 }));
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 9);

    let stored = Orders::find_by_id(order.id).one(&app.state.orm).await?.expect("order");
    assert_eq!(stored.status, OrderStatus::Reserved);
    Ok(())
}

#[tokio::test]
async fn pickup_marks_cash_payment_paid_without_touching_inventory() -> anyhow::Result<()> {
    let mut app = spawn_app().await?;
    let m = marketplace(&app.state, BasketSeed::default()).await?;

    let order = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 2))
        .await?
        .data
        .expect("order")
        .order;

    // The counter may type the code in any case.
    let typed = format!("  {}  ", order.pickup_code.to_lowercase());
    let picked = order_service::validate_pickup(&app.state, &m.merchant, &typed)
        .await?
        .data
        .expect("order");
    assert_eq!(picked.order.status, OrderStatus::PickedUp);
    let payment = picked.payment.expect("payment");
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert!(payment.paid_at.is_some());
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 8);

    let kinds: Vec<_> = app.drain_notifications().into_iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::OrderConfirmed, NotificationKind::OrderPickedUp]
    );
    Ok(())
}

#[tokio::test]
async fn pickup_requires_the_shop_owner() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(&app.state, BasketSeed::default()).await?;
    let rival = common::create_user(&app.state, UserRole::Merchant).await?;
    let admin = common::create_user(&app.state, UserRole::Admin).await?;

    let order = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1))
        .await?
        .data
        .expect("order")
        .order;

    let err = order_service::validate_pickup(&app.state, &rival, &order.pickup_code)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = order_service::validate_pickup(&app.state, &m.merchant, "ZZZZZZ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Admins may validate on behalf of any shop.
    let picked = order_service::validate_pickup(&app.state, &admin, &order.pickup_code)
        .await?
        .data
        .expect("order");
    assert_eq!(picked.order.status, OrderStatus::PickedUp);
    Ok(())
}

#[tokio::test]
async fn no_show_forfeits_the_reserved_units() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(
        &app.state,
        BasketSeed {
            quantity_left: 6,
            ..Default::default()
        },
    )
    .await?;

    let order = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 2))
        .await?
        .data
        .expect("order")
        .order;

    let err = order_service::mark_as_no_show(&app.state, &m.merchant, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TooEarly(_)));

    // Move the pickup window into the past.
    let now = Utc::now().fixed_offset();
    Baskets::update_many()
        .col_expr(BasketCol::PickupStart, Expr::value(now - Duration::hours(3)))
        .col_expr(BasketCol::PickupEnd, Expr::value(now - Duration::minutes(1)))
        .filter(BasketCol::Id.eq(m.basket.id))
        .exec(&app.state.orm)
        .await?;

    let marked = order_service::mark_as_no_show(&app.state, &m.merchant, order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(marked.order.status, OrderStatus::NoShow);
    assert_eq!(marked.payment.expect("payment").status, PaymentStatus::Unpaid);
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 4);
    Ok(())
}

#[tokio::test]
async fn terminal_orders_accept_no_further_transitions() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(&app.state, BasketSeed::default()).await?;

    let picked = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1))
        .await?
        .data
        .expect("order")
        .order;
    order_service::validate_pickup(&app.state, &m.merchant, &picked.pickup_code).await?;

    let cancelled = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1))
        .await?
        .data
        .expect("order")
        .order;
    order_service::cancel_order(&app.state, &m.customer, cancelled.id).await?;

    // Pickup windows are over for everything below.
    let now = Utc::now().fixed_offset();
    Baskets::update_many()
        .col_expr(BasketCol::PickupEnd, Expr::value(now - Duration::minutes(1)))
        .filter(BasketCol::Id.eq(m.basket.id))
        .exec(&app.state.orm)
        .await?;

    for order in [&picked, &cancelled] {
        let err = order_service::cancel_order(&app.state, &m.customer, order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)), "cancel: {err}");

        let err = order_service::validate_pickup(&app.state, &m.merchant, &order.pickup_code)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)), "pickup: {err}");

        let err = order_service::mark_as_no_show(&app.state, &m.merchant, order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)), "no-show: {err}");
    }

    let no_show = Orders::find()
        .filter(OrderCol::Status.eq(OrderStatus::NoShow))
        .filter(OrderCol::BasketId.eq(m.basket.id))
        .one(&app.state.orm)
        .await?;
    assert!(no_show.is_none());

    // One unit went home with the customer, the cancelled one came back.
    assert_eq!(reload_basket(&app.state, m.basket.id).await?.quantity_left, 9);
    Ok(())
}

#[tokio::test]
async fn cancelling_a_paid_order_refunds_it() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(&app.state, BasketSeed::default()).await?;

    let created = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1))
        .await?
        .data
        .expect("order");
    let payment = created.payment.expect("payment");
    payment_service::mark_as_paid(&app.state, &m.merchant, payment.id).await?;

    let cancelled = order_service::cancel_order(&app.state, &m.customer, created.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.payment.expect("payment").status, PaymentStatus::Refunded);
    Ok(())
}

#[tokio::test]
async fn order_views_follow_the_state_machine() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let m = marketplace(&app.state, BasketSeed::default()).await?;
    let stranger = common::create_user(&app.state, UserRole::Customer).await?;

    let first = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 1))
        .await?
        .data
        .expect("order")
        .order;
    let second = order_service::create_order(&app.state, &m.customer, order_for(m.basket.id, 2))
        .await?
        .data
        .expect("order")
        .order;
    order_service::cancel_order(&app.state, &m.customer, first.id).await?;

    let mine = order_service::list_my_orders(&app.state, &m.customer, OrderListQuery::default())
        .await?;
    assert_eq!(mine.meta.as_ref().and_then(|meta| meta.total), Some(2));
    assert_eq!(mine.data.expect("orders").items.len(), 2);

    let reserved = order_service::list_my_orders(
        &app.state,
        &m.customer,
        OrderListQuery {
            status: Some(OrderStatus::Reserved),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("orders");
    assert_eq!(reserved.items.len(), 1);
    assert_eq!(reserved.items[0].id, second.id);

    let shop_orders = order_service::list_shop_orders(
        &app.state,
        &m.merchant,
        m.shop.id,
        OrderListQuery {
            status: Some(OrderStatus::Cancelled),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("orders");
    assert_eq!(shop_orders.items.len(), 1);
    assert_eq!(shop_orders.items[0].id, first.id);

    let err =
        order_service::list_shop_orders(&app.state, &stranger, m.shop.id, OrderListQuery::default())
            .await
            .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let by_code = order_service::get_order_by_pickup_code(
        &app.state,
        &m.merchant,
        &second.pickup_code.to_lowercase(),
    )
    .await?
    .data
    .expect("order");
    assert_eq!(by_code.order.id, second.id);

    let err = order_service::get_order(&app.state, &stranger, second.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    Ok(())
}
