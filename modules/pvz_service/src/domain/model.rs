use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a wire value is outside of an enum's allow-list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `FromStr`, `Display` and `as_str` for a closed wire enum.
macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum City {
    #[serde(rename = "Москва")]
    Moscow,
    #[serde(rename = "Санкт-Петербург")]
    SaintPetersburg,
    #[serde(rename = "Казань")]
    Kazan,
}

wire_enum!(City, "city", {
    Moscow => "Москва",
    SaintPetersburg => "Санкт-Петербург",
    Kazan => "Казань",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReceptionStatus {
    InProgress,
    Finished,
}

wire_enum!(ReceptionStatus, "reception status", {
    InProgress => "in_progress",
    Finished => "finished",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum ProductType {
    #[serde(rename = "электроника")]
    Electronics,
    #[serde(rename = "одежда")]
    Clothes,
    #[serde(rename = "обувь")]
    Shoes,
}

wire_enum!(ProductType, "product type", {
    Electronics => "электроника",
    Clothes => "одежда",
    Shoes => "обувь",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Moderator,
}

wire_enum!(Role, "role", {
    Employee => "employee",
    Moderator => "moderator",
});

/// A pickup point. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pvz {
    pub id: Uuid,
    pub registration_date: DateTime<Utc>,
    pub city: City,
}

#[derive(Debug, Clone)]
pub struct NewPvz {
    pub id: Uuid,
    pub registration_date: DateTime<Utc>,
    pub city: City,
}

/// An intake batch at a pickup point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reception {
    pub id: Uuid,
    pub date_time: DateTime<Utc>,
    pub pvz_id: Uuid,
    pub status: ReceptionStatus,
}

impl Reception {
    pub fn is_open(&self) -> bool {
        self.status == ReceptionStatus::InProgress
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub date_time: DateTime<Utc>,
    pub product_type: ProductType,
    pub reception_id: Uuid,
}

/// A registered account. `password_hash` never leaves the service.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceptionWithProducts {
    pub reception: Reception,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvzWithReceptions {
    pub pvz: Pvz,
    pub receptions: Vec<ReceptionWithProducts>,
}

/// Inclusive time window; a missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
    }
}

/// 1-indexed pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
    limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 10;

    /// Returns `None` when either value is zero.
    pub fn new(number: u32, limit: u32) -> Option<Self> {
        (number >= 1 && limit >= 1).then_some(Self { number, limit })
    }

    /// First page with no practical limit.
    pub fn unbounded() -> Self {
        Self {
            number: 1,
            limit: u32::MAX,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1).saturating_mul(u64::from(self.limit))
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PvzSearch {
    pub window: DateWindow,
    pub page: Page,
}

impl PvzSearch {
    /// Every pickup point, regardless of registration date.
    pub fn all() -> Self {
        Self {
            window: DateWindow::default(),
            page: Page::unbounded(),
        }
    }
}
