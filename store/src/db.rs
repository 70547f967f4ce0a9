use std::sync::Arc;

use anyhow::Context;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;

use crate::schema;

/// Thin wrapper around a driver-agnostic connection pool, mirroring this
/// codebase's `Db { pool: Arc<AnyPool> }`.
#[derive(Clone)]
pub struct Db {
    pub pool: Arc<AnyPool>,
}

impl Db {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to store at {database_url}"))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .with_context(|| format!("running migration statement: {statement}"))?;
        }
        Ok(())
    }
}
