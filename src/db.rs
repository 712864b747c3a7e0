use std::{future::Future, time::Duration};

use anyhow::Result;
use rand::Rng;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, DbErr, IsolationLevel, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;

use crate::{
    error::{AppError, AppResult},
    migration::Migrator,
};

pub type OrmConn = DatabaseConnection;

/// Attempts made for one unit of work before a conflict is surfaced.
pub const MAX_TXN_ATTEMPTS: u32 = 5;

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);
    // An in-memory SQLite database exists per connection, so the pool must
    // hold exactly one for every query to see the same schema.
    if database_url.starts_with("sqlite") && database_url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }
    let conn = Database::connect(options).await?;
    Ok(conn)
}

/// Apply every pending schema migration.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    Migrator::up(conn, None).await?;
    Ok(())
}

/// Open a transaction at SERIALIZABLE isolation.
///
/// SQLite has no per-transaction isolation setting; it already serializes
/// writers, so the transaction is opened with the backend default there.
pub async fn begin_serializable(
    conn: &DatabaseConnection,
) -> Result<DatabaseTransaction, DbErr> {
    let isolation = match conn.get_database_backend() {
        DatabaseBackend::Sqlite => None,
        _ => Some(IsolationLevel::Serializable),
    };
    conn.begin_with_config(isolation, None).await
}

/// Run `unit` until it succeeds, fails with a non-retryable error, or has
/// hit a storage conflict [`MAX_TXN_ATTEMPTS`] times.
///
/// `unit` must open, use and commit its own transaction so that a re-run
/// starts from freshly read state.
pub async fn retry_on_conflict<T, F, Fut>(label: &str, mut unit: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match unit().await {
            Err(err) if err.is_retryable() => {
                if attempt >= MAX_TXN_ATTEMPTS {
                    tracing::error!(operation = label, attempt, error = ?err, "transaction conflict, giving up");
                    return Err(AppError::Conflict(format!(
                        "{label} could not complete due to concurrent updates, please retry"
                    )));
                }
                tracing::warn!(operation = label, attempt, error = ?err, "transaction conflict, retrying");
                let jitter = rand::thread_rng().gen_range(0..20);
                tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt) + jitter)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
