use std::sync::Arc;

use tracing::info;

use abi::config::{Config, StoreBackend};
use abi::errors::{Error, Result};

mod document;
mod memory;
mod postgres;
mod watch;

pub use document::DocumentStore;
pub use memory::{MemoryStore, StoreOp};
pub use postgres::{PostgresStore, CHANGE_CHANNEL};
pub use watch::watch_collection;

/// build the store selected by `db.backend`
pub async fn store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    match config.db.backend {
        StoreBackend::Memory => {
            info!("using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pg = config.db.postgres.as_ref().ok_or_else(|| {
                Error::internal_with_details("postgres backend selected without db.postgres")
            })?;
            info!("connecting to postgres at {}:{}", pg.host, pg.port);
            Ok(Arc::new(PostgresStore::new(pg).await?))
        }
    }
}
