//! SQLite database for the fleetgate hub.

use std::path::Path;

use sqlx::{Pool, Sqlite};
use tracing::info;

use fleetgate_core::db::{open_pool, open_pool_in_memory, DatabaseError};

/// Handle to the hub's user/audit database.
#[derive(Clone)]
pub struct HubDatabase {
    pool: Pool<Sqlite>,
}

impl HubDatabase {
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let pool = open_pool(path).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let pool = open_pool_in_memory().await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        info!("Hub database migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}
