use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::errors::map_sqlx;
use super::{decode_enum, page_bounds, PgStorage};
use crate::domain::model::{NewPvz, Pvz, PvzSearch};
use crate::domain::ports::{PvzRepo, StorageError};

fn pvz_from_row(row: &PgRow) -> Result<Pvz, StorageError> {
    let id: Uuid = row.try_get("id").map_err(map_sqlx)?;
    let registration_date: DateTime<Utc> = row.try_get("registration_date").map_err(map_sqlx)?;
    let city: String = row.try_get("city").map_err(map_sqlx)?;
    Ok(Pvz {
        id,
        registration_date,
        city: decode_enum(&city)?,
    })
}

#[async_trait]
impl PvzRepo for PgStorage {
    async fn create_pvz(&self, new: NewPvz) -> Result<Pvz, StorageError> {
        let row = sqlx::query(
            "INSERT INTO pvz (id, registration_date, city) VALUES ($1, $2, $3) \
             RETURNING id, registration_date, city",
        )
        .bind(new.id)
        .bind(new.registration_date)
        .bind(new.city.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        pvz_from_row(&row)
    }

    async fn list_pvz(&self, search: &PvzSearch) -> Result<Vec<Pvz>, StorageError> {
        let (limit, offset) = page_bounds(search.page.limit(), search.page.offset());
        let rows = sqlx::query(
            "SELECT id, registration_date, city FROM pvz \
             WHERE ($1::timestamptz IS NULL OR registration_date >= $1) \
               AND ($2::timestamptz IS NULL OR registration_date <= $2) \
             ORDER BY registration_date, id \
             LIMIT $3 OFFSET $4",
        )
        .bind(search.window.start)
        .bind(search.window.end)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(pvz_from_row).collect()
    }
}
