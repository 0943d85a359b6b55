// db/db.rs
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::ledger::{LedgerStore, LedgerUnit, StoreError};
use super::pgledger::PgLedgerUnit;

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

impl DBClient {
    /// `lock_timeout` bounds how long any statement inside a unit waits for
    /// a row lock, and twice that bounds any single statement.
    pub fn new(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        DBClient { pool, lock_timeout }
    }
}

#[async_trait]
impl LedgerStore for DBClient {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let lock_ms = self.lock_timeout.as_millis().max(1);
        // SET LOCAL takes no bind parameters; both values are integers we own.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", lock_ms))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("SET LOCAL statement_timeout = '{}ms'", lock_ms * 2))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgLedgerUnit::new(tx)))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
