use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub sweep_interval_secs: u64,
    pub default_currency: String,
    pub orders: OrderSettings,
}

/// Tunables consumed by the reservation state machine.
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub cancel_cutoff_minutes: i64,
    pub pickup_code_length: usize,
    pub max_quantity_per_order: i32,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            cancel_cutoff_minutes: 30,
            pickup_code_length: 6,
            max_quantity_per_order: 5,
        }
    }
}

impl OrderSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cancel_cutoff_minutes: env_or("ORDER_CANCEL_CUTOFF_MINUTES", defaults.cancel_cutoff_minutes),
            pickup_code_length: env_or("ORDER_PICKUP_CODE_LENGTH", defaults.pickup_code_length),
            max_quantity_per_order: env_or(
                "BASKET_MAX_QUANTITY_PER_ORDER",
                defaults.max_quantity_per_order,
            ),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_or("APP_PORT", 3000);
        let default_currency = env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "MRU".to_string());
        Ok(Self {
            port,
            database_url,
            host,
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 60),
            default_currency,
            orders: OrderSettings::from_env(),
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}
