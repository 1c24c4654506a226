pub mod memory;
pub mod postgres;

use std::sync::Arc;

use crate::domain::ports::{PvzRepo, ReceptionRepo, UserRepo};

/// Storage capabilities handed to the services.
#[derive(Clone)]
pub struct Storage {
    pub pvz: Arc<dyn PvzRepo>,
    pub receptions: Arc<dyn ReceptionRepo>,
    pub users: Arc<dyn UserRepo>,
}

impl Storage {
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: PvzRepo + ReceptionRepo + UserRepo + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            pvz: backend.clone(),
            receptions: backend.clone(),
            users: backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_backend(memory::MemoryStorage::new())
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_backend(postgres::PgStorage::new(pool))
    }
}
