use crate::domain::ports::StorageError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// Raised by the `products_require_open_reception` trigger.
const RECEPTION_NOT_IN_PROGRESS: &str = "PV002";

const PVZ_PKEY: &str = "pvz_pkey";
const ONE_OPEN_RECEPTION: &str = "receptions_one_in_progress_per_pvz";
const USERS_EMAIL_KEY: &str = "users_email_key";
const RECEPTIONS_PVZ_FKEY: &str = "receptions_pvz_id_fkey";

/// Maps a SQLSTATE and violated constraint to a storage error kind.
pub(crate) fn classify(code: Option<&str>, constraint: Option<&str>) -> Option<StorageError> {
    match (code?, constraint) {
        (UNIQUE_VIOLATION, Some(PVZ_PKEY)) => Some(StorageError::DuplicatePvzId),
        (UNIQUE_VIOLATION, Some(ONE_OPEN_RECEPTION)) => Some(StorageError::ReceptionAlreadyOpen),
        (UNIQUE_VIOLATION, Some(USERS_EMAIL_KEY)) => Some(StorageError::DuplicateEmail),
        (FOREIGN_KEY_VIOLATION, Some(RECEPTIONS_PVZ_FKEY)) => Some(StorageError::PvzNotFound),
        (RECEPTION_NOT_IN_PROGRESS, _) => Some(StorageError::ReceptionNotInProgress),
        _ => None,
    }
}

pub(crate) fn map_sqlx(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if let Some(mapped) = classify(db.code().as_deref(), db.constraint()) {
            return mapped;
        }
    }
    StorageError::backend(e)
}
