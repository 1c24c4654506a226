use uuid::Uuid;

use crate::domain::ports::{AuthError, StorageError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the lifecycle engine and the account service.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error(
        "can't start new reception, already in-progress{}",
        .reception_id.map(|id| format!(": {id}")).unwrap_or_default()
    )]
    ReceptionInProgress { reception_id: Option<Uuid> },

    #[error("no in-progress reception found")]
    NoOpenReception { pvz_id: Uuid },

    #[error("no product in reception")]
    NoProduct { reception_id: Uuid },

    #[error("pvz already exists: {id}")]
    PvzAlreadyExists { id: Uuid },

    #[error("pvz not found: {id}")]
    PvzNotFound { id: Uuid },

    #[error("user already exists: {email}")]
    UserAlreadyExists { email: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{message}")]
    Validation { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_from(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// True for errors whose message is safe to hand back to the caller.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Internal { .. } | Self::Cancelled | Self::DeadlineExceeded
        )
    }
}

impl From<AuthError> for DomainError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidToken(_) => DomainError::InvalidCredentials,
            AuthError::Signing(_) => {
                DomainError::internal_from("token service failure", e)
            }
        }
    }
}

/// Wraps a storage failure that no caller-level rule accounts for.
pub(crate) fn unexpected(op: &'static str, e: StorageError) -> DomainError {
    DomainError::internal_from(format!("{op}: unexpected storage failure"), e)
}
