pub mod basket_service;
pub mod inventory;
pub mod notification_service;
pub mod order_service;
pub mod payment_service;
pub mod pickup_code;
pub mod shop_service;
