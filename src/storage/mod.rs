//! Event store backends.

mod helpers;
mod memory;
mod postgres;
pub mod schema;
mod sqlite;

pub use memory::MemoryEventStore;
pub use postgres::PostgresEventStore;
pub use sqlite::SqliteEventStore;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::event_store::{EventStore, Result};
use helpers::unavailable;

/// Initialize an event store based on configuration.
///
/// Builds the connection pool, applies the schema, and returns the backend
/// behind the `EventStore` trait.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    match config.storage_type {
        StorageType::Postgres => {
            info!(uri = %config.postgres.uri, "Event store: postgres");

            let mut options = PgPoolOptions::new().max_connections(config.postgres.pool_size);
            if let Some(timeout_ms) = config.postgres.statement_timeout_ms {
                options = options.after_connect(move |conn, _meta| {
                    Box::pin(async move {
                        sqlx::query(&format!("SET statement_timeout = {timeout_ms}"))
                            .execute(&mut *conn)
                            .await?;
                        Ok(())
                    })
                });
            }
            let pool = options
                .connect(&config.postgres.uri)
                .await
                .map_err(unavailable)?;

            let store = PostgresEventStore::new(pool);
            store.init().await?;
            Ok(Arc::new(store))
        }
        StorageType::Sqlite => {
            info!(uri = %config.sqlite.uri, "Event store: sqlite");

            let pool = SqlitePoolOptions::new()
                .max_connections(config.sqlite.pool_size)
                .connect(&config.sqlite.uri)
                .await
                .map_err(unavailable)?;

            let store = SqliteEventStore::new(pool);
            store.init().await?;
            Ok(Arc::new(store))
        }
        StorageType::Memory => {
            info!("Event store: memory");
            Ok(Arc::new(MemoryEventStore::new()))
        }
    }
}
