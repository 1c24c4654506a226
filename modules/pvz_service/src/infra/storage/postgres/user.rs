use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::errors::map_sqlx;
use super::{decode_enum, PgStorage};
use crate::domain::model::{NewUser, User};
use crate::domain::ports::{StorageError, UserRepo};

fn user_from_row(row: &PgRow) -> Result<User, StorageError> {
    let role: String = row.try_get("role").map_err(map_sqlx)?;
    Ok(User {
        id: row.try_get("id").map_err(map_sqlx)?,
        email: row.try_get("email").map_err(map_sqlx)?,
        password_hash: row.try_get("password_hash").map_err(map_sqlx)?,
        role: decode_enum(&role)?,
    })
}

#[async_trait]
impl UserRepo for PgStorage {
    async fn create_user(&self, new: NewUser) -> Result<User, StorageError> {
        let row = sqlx::query(
            "INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, $3, $4) \
             RETURNING id, email, password_hash, role",
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        user_from_row(&row)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        let row = sqlx::query("SELECT id, email, password_hash, role FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or(StorageError::UserNotFound)?;
        user_from_row(&row)
    }
}
