use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        baskets::{BasketList, CreateBasketRequest, UpdateBasketRequest},
        notifications::{MarkedRead, NotificationList, UnreadCount},
        orders::{CreateOrderRequest, OrderList, OrderWithPayment, ValidatePickupRequest},
        payments::UpdatePaymentProviderRequest,
    },
    entity::{
        baskets::BasketStatus,
        notifications::NotificationKind,
        orders::OrderStatus,
        payments::{PaymentProvider, PaymentStatus},
    },
    models::{Basket, Notification, Order, Payment},
    response::{ApiResponse, Meta},
    routes::{baskets, health, merchant, notifications, orders, params, payments},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        baskets::list_available_baskets,
        baskets::get_basket,
        merchant::create_basket,
        merchant::update_basket,
        merchant::delete_basket,
        merchant::publish_basket,
        merchant::unpublish_basket,
        merchant::list_shop_baskets,
        merchant::list_shop_orders,
        merchant::validate_pickup,
        merchant::get_order_by_pickup_code,
        merchant::mark_as_no_show,
        orders::create_order,
        orders::list_my_orders,
        orders::get_order,
        orders::cancel_order,
        payments::get_payment_by_order,
        payments::update_payment_provider,
        payments::mark_as_pending,
        payments::mark_as_paid,
        payments::refund_payment,
        notifications::list_my_notifications,
        notifications::unread_count,
        notifications::mark_as_read,
        notifications::mark_all_as_read
    ),
    components(
        schemas(
            Basket,
            Order,
            Payment,
            Notification,
            BasketStatus,
            OrderStatus,
            PaymentStatus,
            PaymentProvider,
            NotificationKind,
            CreateBasketRequest,
            UpdateBasketRequest,
            UpdatePaymentProviderRequest,
            BasketList,
            CreateOrderRequest,
            ValidatePickupRequest,
            OrderWithPayment,
            OrderList,
            NotificationList,
            UnreadCount,
            MarkedRead,
            params::Pagination,
            params::SortOrder,
            Meta,
            ApiResponse<Basket>,
            ApiResponse<BasketList>,
            ApiResponse<OrderWithPayment>,
            ApiResponse<OrderList>,
            ApiResponse<Payment>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Baskets", description = "Public basket catalogue"),
        (name = "Merchant", description = "Basket management and pickup counter"),
        (name = "Orders", description = "Customer reservations"),
        (name = "Payments", description = "Payment tracking"),
        (name = "Notifications", description = "In-app notifications"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
