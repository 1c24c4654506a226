mod pvz;
mod reception;
mod user;

pub use pvz::PvzService;
pub use reception::ReceptionService;
pub use user::UserService;

use crate::domain::error::DomainError;

/// Logs an operation failure at a level matching its kind.
pub(crate) fn log_failure(op: &'static str, e: &DomainError) {
    match e {
        DomainError::Internal { .. } => tracing::error!(op, error = ?e, "operation failed"),
        DomainError::Cancelled | DomainError::DeadlineExceeded => {
            tracing::warn!(op, error = %e, "operation aborted")
        }
        _ => tracing::debug!(op, error = %e, "operation rejected"),
    }
}
