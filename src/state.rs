use std::sync::Arc;

use crate::{
    config::{AppConfig, OrderSettings},
    db::OrmConn,
    services::notification_service::Notifier,
};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub settings: Arc<OrderSettings>,
    pub default_currency: Arc<str>,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(orm: OrmConn, config: &AppConfig, notifier: Notifier) -> Self {
        Self {
            orm,
            settings: Arc::new(config.orders.clone()),
            default_currency: Arc::from(config.default_currency.as_str()),
            notifier,
        }
    }
}
