//! Capability traits the engine and the transport adapters depend on.
//! Storage backends implement all of the repository traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::context::OpContext;
use crate::domain::error::{BoxError, DomainError};
use crate::domain::model::{
    DateWindow, NewPvz, NewUser, Product, ProductType, Pvz, PvzSearch, Reception, Role, User,
};

/// Storage-level failure taxonomy. Backends translate their own conflict
/// signals into these kinds; anything else is `Backend`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("pvz already exists")]
    DuplicatePvzId,
    #[error("pvz not found")]
    PvzNotFound,
    #[error("another reception is already in progress")]
    ReceptionAlreadyOpen,
    #[error("reception is not in progress")]
    ReceptionNotInProgress,
    #[error("no in-progress reception found")]
    NoOpenReception,
    #[error("no product in reception")]
    NoProduct,
    #[error("user already exists")]
    DuplicateEmail,
    #[error("user not found")]
    UserNotFound,
    #[error("storage backend failure")]
    Backend(#[source] BoxError),
}

impl StorageError {
    pub fn backend(e: impl Into<BoxError>) -> Self {
        Self::Backend(e.into())
    }
}

#[async_trait]
pub trait PvzRepo: Send + Sync {
    async fn create_pvz(&self, new: NewPvz) -> Result<Pvz, StorageError>;

    /// Ordered by registration date, then id.
    async fn list_pvz(&self, search: &PvzSearch) -> Result<Vec<Pvz>, StorageError>;
}

#[async_trait]
pub trait ReceptionRepo: Send + Sync {
    /// Starts a unit of work. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn ReceptionTx>, StorageError>;

    /// Receptions of the given pickup points whose date falls in `window`,
    /// ordered by date, then id.
    async fn list_receptions(
        &self,
        pvz_ids: &[Uuid],
        window: &DateWindow,
    ) -> Result<Vec<Reception>, StorageError>;

    /// Products of the given receptions in the order they were added.
    async fn list_products(&self, reception_ids: &[Uuid]) -> Result<Vec<Product>, StorageError>;
}

/// Transactional view over receptions and products.
#[async_trait]
pub trait ReceptionTx: Send {
    async fn get_open_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError>;

    /// Fails with `ReceptionAlreadyOpen` when the storage-side uniqueness
    /// constraint rejects a second in-progress reception.
    async fn create_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError>;

    async fn finish_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError>;

    /// Fails with `ReceptionNotInProgress` when the target reception is no
    /// longer open at insert time.
    async fn add_product(
        &mut self,
        reception_id: Uuid,
        product_type: ProductType,
    ) -> Result<Product, StorageError>;

    async fn get_last_product(&mut self, reception_id: Uuid) -> Result<Product, StorageError>;

    async fn delete_product(&mut self, product_id: Uuid) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> Result<User, StorageError>;
    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError>;
}

/// Read capability over pickup points, shared by the engine and the gRPC adapter.
#[async_trait]
pub trait PvzFinder: Send + Sync {
    async fn find_pvz(&self, ctx: &OpContext, search: &PvzSearch) -> Result<Vec<Pvz>, DomainError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("failed to sign token")]
    Signing(#[source] BoxError),
}

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub role: Role,
    #[serde(rename = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub exp: i64,
}

impl Claims {
    pub fn is_any_of(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}

pub trait TokenService: Send + Sync {
    fn issue(&self, role: Role, user_id: Option<Uuid>) -> Result<String, AuthError>;
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> String;
    fn verify(&self, password: &str, stored: &str) -> bool;
}
