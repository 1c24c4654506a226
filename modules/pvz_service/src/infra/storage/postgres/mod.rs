//! PostgreSQL storage backend built on a shared `sqlx` pool.

mod errors;
mod pvz;
mod reception;
mod user;

use std::str::FromStr;

use anyhow::Context;
use sqlx::postgres::PgPool;

use crate::domain::model::UnknownVariant;
use crate::domain::ports::StorageError;

pub use reception::PgReceptionTx;

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Applies the bundled schema migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to apply pvz_service migrations")
}

/// Decodes a wire-valued text column. Rows violating the CHECK constraints
/// mean the schema and the code disagree.
fn decode_enum<T>(raw: &str) -> Result<T, StorageError>
where
    T: FromStr<Err = UnknownVariant>,
{
    raw.parse::<T>().map_err(StorageError::backend)
}

fn page_bounds(limit: u32, offset: u64) -> (i64, i64) {
    (
        i64::from(limit),
        i64::try_from(offset).unwrap_or(i64::MAX),
    )
}
