use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::domain::context::OpContext;
use crate::domain::error::{unexpected, DomainError};
use crate::domain::model::{NewPvz, Pvz, PvzSearch};
use crate::domain::ports::{PvzFinder, PvzRepo, StorageError};
use crate::domain::service::log_failure;

/// Pickup point registration and lookup.
#[derive(Clone)]
pub struct PvzService {
    repo: Arc<dyn PvzRepo>,
}

impl PvzService {
    pub fn new(repo: Arc<dyn PvzRepo>) -> Self {
        Self { repo }
    }

    #[instrument(
        name = "pvz.service.create_pvz",
        skip(self, ctx, new),
        fields(request_id = %ctx.request_id, pvz_id = %new.id, city = %new.city)
    )]
    pub async fn create_pvz(&self, ctx: &OpContext, new: NewPvz) -> Result<Pvz, DomainError> {
        let id = new.id;
        let res = ctx
            .run(async {
                self.repo.create_pvz(new).await.map_err(|e| match e {
                    StorageError::DuplicatePvzId => DomainError::PvzAlreadyExists { id },
                    other => unexpected("create_pvz", other),
                })
            })
            .await;

        match &res {
            Ok(pvz) => info!(pvz_id = %pvz.id, "pvz created"),
            Err(e) => log_failure("create_pvz", e),
        }
        res
    }
}

#[async_trait]
impl PvzFinder for PvzService {
    #[instrument(
        name = "pvz.service.find_pvz",
        skip(self, ctx, search),
        fields(request_id = %ctx.request_id, page = search.page.number(), limit = search.page.limit())
    )]
    async fn find_pvz(&self, ctx: &OpContext, search: &PvzSearch) -> Result<Vec<Pvz>, DomainError> {
        ctx.run(async {
            self.repo
                .list_pvz(search)
                .await
                .map_err(|e| unexpected("list_pvz", e))
        })
        .await
        .inspect_err(|e| log_failure("find_pvz", e))
    }
}
