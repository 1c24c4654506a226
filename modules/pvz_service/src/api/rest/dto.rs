use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::model::{
    City, Product, ProductType, Pvz, PvzWithReceptions, Reception, ReceptionStatus,
    ReceptionWithProducts, Role, User,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DummyLoginRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public view of an account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDto {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// `id` and `registrationDate` are generated when omitted.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePvzRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub registration_date: Option<DateTime<Utc>>,
    pub city: City,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PvzDto {
    pub id: Uuid,
    pub registration_date: DateTime<Utc>,
    pub city: City,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReceptionRequest {
    pub pvz_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceptionDto {
    pub id: Uuid,
    pub date_time: DateTime<Utc>,
    pub pvz_id: Uuid,
    pub status: ReceptionStatus,
}

/// The product type is kept as text so an unknown value is reported by the
/// engine rather than as a body decoding failure.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddProductRequest {
    #[serde(rename = "type")]
    pub product_type: String,
    pub pvz_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub id: Uuid,
    pub date_time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub reception_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReceptionWithProductsDto {
    pub reception: ReceptionDto,
    pub products: Vec<ProductDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PvzWithReceptionsDto {
    pub pvz: PvzDto,
    pub receptions: Vec<ReceptionWithProductsDto>,
}

/// Raw `GET /pvz` query; validated by the handler.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    pub request_id: String,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            role: u.role,
        }
    }
}

impl From<Pvz> for PvzDto {
    fn from(p: Pvz) -> Self {
        Self {
            id: p.id,
            registration_date: p.registration_date,
            city: p.city,
        }
    }
}

impl From<Reception> for ReceptionDto {
    fn from(r: Reception) -> Self {
        Self {
            id: r.id,
            date_time: r.date_time,
            pvz_id: r.pvz_id,
            status: r.status,
        }
    }
}

impl From<Product> for ProductDto {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            date_time: p.date_time,
            product_type: p.product_type,
            reception_id: p.reception_id,
        }
    }
}

impl From<ReceptionWithProducts> for ReceptionWithProductsDto {
    fn from(r: ReceptionWithProducts) -> Self {
        Self {
            reception: r.reception.into(),
            products: r.products.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<PvzWithReceptions> for PvzWithReceptionsDto {
    fn from(p: PvzWithReceptions) -> Self {
        Self {
            pvz: p.pvz.into(),
            receptions: p.receptions.into_iter().map(Into::into).collect(),
        }
    }
}
