//! Per-dataset mutual exclusion
//!
//! A run holds a PostgreSQL session advisory lock on its own pooled connection
//! for its whole duration. Because the lock belongs to the session, a guard that
//! is dropped without [`DatasetLock::release`] (cancelled future, panic) closes
//! its connection instead of returning it to the pool.
//!
//! Locks use the two-key form: [`LOCK_NAMESPACE`] keeps them apart from other
//! advisory lock users of the same database, and the second key is the 32-bit
//! `hashtext` of the dataset name. Two dataset names with the same hash would
//! serialize against each other and report `AlreadyRunning`.

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

/// First advisory lock key of every dataset lock ("ODP" in ASCII)
pub const LOCK_NAMESPACE: i32 = 0x004F_4450;

pub struct DatasetLock {
    conn: PoolConnection<Postgres>,
    dataset: String,
    released: bool,
}

impl DatasetLock {
    /// Take the lock or fail immediately with `AlreadyRunning`
    pub async fn acquire(pool: &PgPool, dataset: &str) -> Result<Self> {
        let mut conn = pool.acquire().await?;

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1, hashtext($2))")
            .bind(LOCK_NAMESPACE)
            .bind(dataset)
            .fetch_one(&mut *conn)
            .await?;

        if !locked {
            return Err(IngestError::AlreadyRunning(dataset.to_string()));
        }

        debug!(dataset, "Dataset lock acquired");
        Ok(Self {
            conn,
            dataset: dataset.to_string(),
            released: false,
        })
    }

    /// The connection that owns the lock; every stage of the run uses it
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    pub async fn release(mut self) -> Result<()> {
        let unlocked: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1, hashtext($2))")
            .bind(LOCK_NAMESPACE)
            .bind(&self.dataset)
            .fetch_one(&mut *self.conn)
            .await?;

        if !unlocked {
            return Err(IngestError::Stage(format!(
                "advisory lock for {} was not held at release",
                self.dataset
            )));
        }

        self.released = true;
        debug!(dataset = %self.dataset, "Dataset lock released");
        Ok(())
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                dataset = %self.dataset,
                "Dataset lock dropped while held; closing its connection"
            );
            self.conn.close_on_drop();
        }
    }
}
