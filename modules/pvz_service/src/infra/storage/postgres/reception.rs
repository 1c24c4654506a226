use async_trait::async_trait;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Row, Transaction};
use uuid::Uuid;

use super::errors::map_sqlx;
use super::{decode_enum, PgStorage};
use crate::domain::model::{DateWindow, Product, ProductType, Reception, ReceptionStatus};
use crate::domain::ports::{ReceptionRepo, ReceptionTx, StorageError};

const RECEPTION_COLUMNS: &str = "id, date_time, pvz_id, status";
const PRODUCT_COLUMNS: &str = "id, date_time, type, reception_id";

fn reception_from_row(row: &PgRow) -> Result<Reception, StorageError> {
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    Ok(Reception {
        id: row.try_get("id").map_err(map_sqlx)?,
        date_time: row.try_get("date_time").map_err(map_sqlx)?,
        pvz_id: row.try_get("pvz_id").map_err(map_sqlx)?,
        status: decode_enum(&status)?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StorageError> {
    let product_type: String = row.try_get("type").map_err(map_sqlx)?;
    Ok(Product {
        id: row.try_get("id").map_err(map_sqlx)?,
        date_time: row.try_get("date_time").map_err(map_sqlx)?,
        product_type: decode_enum(&product_type)?,
        reception_id: row.try_get("reception_id").map_err(map_sqlx)?,
    })
}

#[async_trait]
impl ReceptionRepo for PgStorage {
    async fn begin(&self) -> Result<Box<dyn ReceptionTx>, StorageError> {
        let tx = self.pool.begin().await.map_err(map_sqlx)?;
        Ok(Box::new(PgReceptionTx { tx }))
    }

    async fn list_receptions(
        &self,
        pvz_ids: &[Uuid],
        window: &DateWindow,
    ) -> Result<Vec<Reception>, StorageError> {
        if pvz_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {RECEPTION_COLUMNS} FROM receptions \
             WHERE pvz_id = ANY($1) \
               AND ($2::timestamptz IS NULL OR date_time >= $2) \
               AND ($3::timestamptz IS NULL OR date_time <= $3) \
             ORDER BY date_time, id"
        ))
        .bind(pvz_ids)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(reception_from_row).collect()
    }

    async fn list_products(&self, reception_ids: &[Uuid]) -> Result<Vec<Product>, StorageError> {
        if reception_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE reception_id = ANY($1) ORDER BY seq"
        ))
        .bind(reception_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(product_from_row).collect()
    }
}

/// Unit of work over one database transaction. Dropping it rolls back.
pub struct PgReceptionTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ReceptionTx for PgReceptionTx {
    async fn get_open_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {RECEPTION_COLUMNS} FROM receptions \
             WHERE pvz_id = $1 AND status = $2 FOR UPDATE"
        ))
        .bind(pvz_id)
        .bind(ReceptionStatus::InProgress.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(StorageError::NoOpenReception)?;
        reception_from_row(&row)
    }

    async fn create_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError> {
        let row = sqlx::query(&format!(
            "INSERT INTO receptions (id, pvz_id, status) VALUES ($1, $2, $3) \
             RETURNING {RECEPTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(pvz_id)
        .bind(ReceptionStatus::InProgress.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        reception_from_row(&row)
    }

    async fn finish_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError> {
        let row = sqlx::query(&format!(
            "UPDATE receptions SET status = $2 \
             WHERE pvz_id = $1 AND status = $3 \
             RETURNING {RECEPTION_COLUMNS}"
        ))
        .bind(pvz_id)
        .bind(ReceptionStatus::Finished.as_str())
        .bind(ReceptionStatus::InProgress.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(StorageError::NoOpenReception)?;
        reception_from_row(&row)
    }

    async fn add_product(
        &mut self,
        reception_id: Uuid,
        product_type: ProductType,
    ) -> Result<Product, StorageError> {
        let row = sqlx::query(&format!(
            "INSERT INTO products (id, type, reception_id) VALUES ($1, $2, $3) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(product_type.as_str())
        .bind(reception_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        product_from_row(&row)
    }

    async fn get_last_product(&mut self, reception_id: Uuid) -> Result<Product, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE reception_id = $1 \
             ORDER BY date_time DESC, seq DESC LIMIT 1 FOR UPDATE"
        ))
        .bind(reception_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?
        .ok_or(StorageError::NoProduct)?;
        product_from_row(&row)
    }

    async fn delete_product(&mut self, product_id: Uuid) -> Result<(), StorageError> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        if done.rows_affected() == 0 {
            return Err(StorageError::NoProduct);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(map_sqlx)
    }
}
