use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::context::OpContext;
use crate::domain::error::{unexpected, DomainError};
use crate::domain::model::{
    Product, ProductType, PvzSearch, PvzWithReceptions, Reception, ReceptionWithProducts,
};
use crate::domain::ports::{PvzFinder, ReceptionRepo, ReceptionTx, StorageError};
use crate::domain::service::log_failure;

/// Reception lifecycle per pickup point:
///
/// ```text
/// [no reception] --open--> [in_progress] --close--> [finished]
///                            |  add product / delete last product
///                            +--> stays in_progress
/// ```
///
/// Every transition runs in one storage unit of work. The pre-checks below
/// only give a fast rejection; the storage constraints are what keep at most
/// one reception open per pickup point and products out of finished
/// receptions when requests race.
#[derive(Clone)]
pub struct ReceptionService {
    receptions: Arc<dyn ReceptionRepo>,
    pvz: Arc<dyn PvzFinder>,
}

impl ReceptionService {
    pub fn new(receptions: Arc<dyn ReceptionRepo>, pvz: Arc<dyn PvzFinder>) -> Self {
        Self { receptions, pvz }
    }

    async fn begin(&self, op: &'static str) -> Result<Box<dyn ReceptionTx>, DomainError> {
        self.receptions.begin().await.map_err(|e| unexpected(op, e))
    }

    #[instrument(
        name = "pvz.service.open_reception",
        skip(self, ctx),
        fields(request_id = %ctx.request_id, %pvz_id)
    )]
    pub async fn open_reception(
        &self,
        ctx: &OpContext,
        pvz_id: Uuid,
    ) -> Result<Reception, DomainError> {
        const OP: &str = "open_reception";

        let conflict = |e: StorageError| match e {
            StorageError::ReceptionAlreadyOpen => {
                DomainError::ReceptionInProgress { reception_id: None }
            }
            StorageError::PvzNotFound => DomainError::PvzNotFound { id: pvz_id },
            other => unexpected(OP, other),
        };

        let res = ctx
            .run(async {
                let mut tx = self.begin(OP).await?;

                match tx.get_open_reception(pvz_id).await {
                    Ok(existing) => {
                        return Err(DomainError::ReceptionInProgress {
                            reception_id: Some(existing.id),
                        })
                    }
                    Err(StorageError::NoOpenReception) => {}
                    Err(e) => return Err(unexpected(OP, e)),
                }

                let reception = tx.create_reception(pvz_id).await.map_err(conflict)?;
                tx.commit().await.map_err(conflict)?;
                Ok(reception)
            })
            .await;

        match &res {
            Ok(r) => info!(reception_id = %r.id, "reception opened"),
            Err(e) => log_failure(OP, e),
        }
        res
    }

    #[instrument(
        name = "pvz.service.add_product",
        skip(self, ctx),
        fields(request_id = %ctx.request_id, %pvz_id, %product_type)
    )]
    pub async fn add_product(
        &self,
        ctx: &OpContext,
        pvz_id: Uuid,
        product_type: ProductType,
    ) -> Result<Product, DomainError> {
        const OP: &str = "add_product";

        let res = ctx
            .run(async {
                let mut tx = self.begin(OP).await?;
                let reception = open_reception_of(tx.as_mut(), OP, pvz_id).await?;

                // The reception was open when fetched; losing it before the
                // insert is an anomaly rather than a caller mistake.
                let product = tx
                    .add_product(reception.id, product_type)
                    .await
                    .map_err(|e| match e {
                        StorageError::ReceptionNotInProgress => DomainError::internal_from(
                            format!("reception {} closed while adding a product", reception.id),
                            e,
                        ),
                        other => unexpected(OP, other),
                    })?;

                tx.commit().await.map_err(|e| unexpected(OP, e))?;
                Ok(product)
            })
            .await;

        match &res {
            Ok(p) => info!(product_id = %p.id, reception_id = %p.reception_id, "product added"),
            Err(e) => log_failure(OP, e),
        }
        res
    }

    /// Same as [`Self::add_product`] for callers holding an unchecked type name.
    pub async fn add_product_raw(
        &self,
        ctx: &OpContext,
        pvz_id: Uuid,
        raw_type: &str,
    ) -> Result<Product, DomainError> {
        let product_type = raw_type
            .parse::<ProductType>()
            .map_err(|e| DomainError::validation(e.to_string()))?;
        self.add_product(ctx, pvz_id, product_type).await
    }

    /// Removes and returns the most recently added product of the open reception.
    #[instrument(
        name = "pvz.service.delete_last_product",
        skip(self, ctx),
        fields(request_id = %ctx.request_id, %pvz_id)
    )]
    pub async fn delete_last_product(
        &self,
        ctx: &OpContext,
        pvz_id: Uuid,
    ) -> Result<Product, DomainError> {
        const OP: &str = "delete_last_product";

        let res = ctx
            .run(async {
                let mut tx = self.begin(OP).await?;
                let reception = open_reception_of(tx.as_mut(), OP, pvz_id).await?;

                let last = tx
                    .get_last_product(reception.id)
                    .await
                    .map_err(|e| match e {
                        StorageError::NoProduct => DomainError::NoProduct {
                            reception_id: reception.id,
                        },
                        other => unexpected(OP, other),
                    })?;

                tx.delete_product(last.id).await.map_err(|e| match e {
                    StorageError::NoProduct => DomainError::internal_from(
                        format!("product {} vanished before delete", last.id),
                        e,
                    ),
                    other => unexpected(OP, other),
                })?;

                tx.commit().await.map_err(|e| unexpected(OP, e))?;
                Ok(last)
            })
            .await;

        match &res {
            Ok(p) => info!(product_id = %p.id, "last product deleted"),
            Err(e) => log_failure(OP, e),
        }
        res
    }

    #[instrument(
        name = "pvz.service.close_reception",
        skip(self, ctx),
        fields(request_id = %ctx.request_id, %pvz_id)
    )]
    pub async fn close_reception(
        &self,
        ctx: &OpContext,
        pvz_id: Uuid,
    ) -> Result<Reception, DomainError> {
        const OP: &str = "close_reception";

        let res = ctx
            .run(async {
                let mut tx = self.begin(OP).await?;
                let reception = tx.finish_reception(pvz_id).await.map_err(|e| match e {
                    StorageError::NoOpenReception => DomainError::NoOpenReception { pvz_id },
                    other => unexpected(OP, other),
                })?;
                tx.commit().await.map_err(|e| unexpected(OP, e))?;
                Ok(reception)
            })
            .await;

        match &res {
            Ok(r) => info!(reception_id = %r.id, "reception closed"),
            Err(e) => log_failure(OP, e),
        }
        res
    }

    /// Pickup points matching `search` (the window applies to their
    /// registration date), each with its receptions from the same window and
    /// their products. Pickup point order is preserved; points without
    /// receptions are kept with an empty list.
    #[instrument(
        name = "pvz.service.search_receptions",
        skip(self, ctx, search),
        fields(request_id = %ctx.request_id, page = search.page.number(), limit = search.page.limit())
    )]
    pub async fn search_receptions(
        &self,
        ctx: &OpContext,
        search: &PvzSearch,
    ) -> Result<Vec<PvzWithReceptions>, DomainError> {
        const OP: &str = "search_receptions";

        // The finder logs its own failures.
        let points = self.pvz.find_pvz(ctx, search).await?;
        if points.is_empty() {
            return Ok(Vec::new());
        }

        ctx.run(async {
            let pvz_ids: Vec<Uuid> = points.iter().map(|p| p.id).collect();
            let receptions = self
                .receptions
                .list_receptions(&pvz_ids, &search.window)
                .await
                .map_err(|e| unexpected(OP, e))?;

            let reception_ids: Vec<Uuid> = receptions.iter().map(|r| r.id).collect();
            let products = if reception_ids.is_empty() {
                Vec::new()
            } else {
                self.receptions
                    .list_products(&reception_ids)
                    .await
                    .map_err(|e| unexpected(OP, e))?
            };

            let mut products_by_reception: HashMap<Uuid, Vec<Product>> = HashMap::new();
            for product in products {
                products_by_reception
                    .entry(product.reception_id)
                    .or_default()
                    .push(product);
            }

            let mut receptions_by_pvz: HashMap<Uuid, Vec<ReceptionWithProducts>> = HashMap::new();
            for reception in receptions {
                let products = products_by_reception
                    .remove(&reception.id)
                    .unwrap_or_default();
                receptions_by_pvz
                    .entry(reception.pvz_id)
                    .or_default()
                    .push(ReceptionWithProducts {
                        reception,
                        products,
                    });
            }

            Ok(points
                .into_iter()
                .map(|pvz| PvzWithReceptions {
                    receptions: receptions_by_pvz.remove(&pvz.id).unwrap_or_default(),
                    pvz,
                })
                .collect())
        })
        .await
        .inspect_err(|e| log_failure(OP, e))
    }
}

async fn open_reception_of(
    tx: &mut dyn ReceptionTx,
    op: &'static str,
    pvz_id: Uuid,
) -> Result<Reception, DomainError> {
    tx.get_open_reception(pvz_id).await.map_err(|e| match e {
        StorageError::NoOpenReception => DomainError::NoOpenReception { pvz_id },
        other => unexpected(op, other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{City, DateWindow, NewPvz, Page, ReceptionStatus};
    use crate::domain::ports::PvzRepo;
    use crate::domain::service::PvzService;
    use crate::infra::storage::memory::MemoryStorage;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        storage: MemoryStorage,
        svc: ReceptionService,
        ctx: OpContext,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = MemoryStorage::new();
            let pvz = Arc::new(PvzService::new(Arc::new(storage.clone())));
            let svc = ReceptionService::new(Arc::new(storage.clone()), pvz);
            Self {
                storage,
                svc,
                ctx: OpContext::new("test"),
            }
        }

        async fn pvz_registered_at(&self, at: chrono::DateTime<Utc>) -> Uuid {
            self.storage
                .create_pvz(NewPvz {
                    id: Uuid::new_v4(),
                    registration_date: at,
                    city: City::Moscow,
                })
                .await
                .unwrap()
                .id
        }

        async fn pvz(&self) -> Uuid {
            self.pvz_registered_at(Utc::now()).await
        }
    }

    #[tokio::test]
    async fn second_open_reports_the_conflicting_reception() {
        let f = Fixture::new();
        let pvz = f.pvz().await;

        let first = f.svc.open_reception(&f.ctx, pvz).await.unwrap();
        assert_eq!(first.status, ReceptionStatus::InProgress);

        let err = f.svc.open_reception(&f.ctx, pvz).await.unwrap_err();
        assert!(
            matches!(err, DomainError::ReceptionInProgress { reception_id: Some(id) } if id == first.id)
        );
        assert!(err.to_string().contains(&first.id.to_string()));
    }

    #[tokio::test]
    async fn open_for_unknown_pvz_fails() {
        let f = Fixture::new();
        let err = f
            .svc
            .open_reception(&f.ctx, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::PvzNotFound { .. }));
    }

    #[tokio::test]
    async fn add_product_without_open_reception() {
        let f = Fixture::new();
        let pvz = f.pvz().await;
        let err = f
            .svc
            .add_product(&f.ctx, pvz, ProductType::Electronics)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NoOpenReception { pvz_id } if pvz_id == pvz));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn raw_product_type_is_revalidated() {
        let f = Fixture::new();
        let pvz = f.pvz().await;
        f.svc.open_reception(&f.ctx, pvz).await.unwrap();

        let err = f
            .svc
            .add_product_raw(&f.ctx, pvz, "мебель")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let p = f.svc.add_product_raw(&f.ctx, pvz, "обувь").await.unwrap();
        assert_eq!(p.product_type, ProductType::Shoes);
    }

    #[tokio::test]
    async fn add_then_delete_everything() {
        let f = Fixture::new();
        let pvz = f.pvz().await;
        let reception = f.svc.open_reception(&f.ctx, pvz).await.unwrap();

        let mut added = Vec::new();
        for t in [ProductType::Electronics, ProductType::Clothes, ProductType::Shoes] {
            added.push(f.svc.add_product(&f.ctx, pvz, t).await.unwrap());
        }

        for expected in added.iter().rev() {
            let deleted = f.svc.delete_last_product(&f.ctx, pvz).await.unwrap();
            assert_eq!(deleted.id, expected.id);
        }

        let err = f.svc.delete_last_product(&f.ctx, pvz).await.unwrap_err();
        assert!(matches!(err, DomainError::NoProduct { reception_id } if reception_id == reception.id));
    }

    #[tokio::test]
    async fn close_twice_fails_the_second_time() {
        let f = Fixture::new();
        let pvz = f.pvz().await;
        f.svc.open_reception(&f.ctx, pvz).await.unwrap();

        let closed = f.svc.close_reception(&f.ctx, pvz).await.unwrap();
        assert_eq!(closed.status, ReceptionStatus::Finished);

        let err = f.svc.close_reception(&f.ctx, pvz).await.unwrap_err();
        assert!(matches!(err, DomainError::NoOpenReception { .. }));
    }

    #[tokio::test]
    async fn closed_reception_blocks_deletes_and_allows_reopen() {
        let f = Fixture::new();
        let pvz = f.pvz().await;
        let first = f.svc.open_reception(&f.ctx, pvz).await.unwrap();
        f.svc.add_product(&f.ctx, pvz, ProductType::Clothes).await.unwrap();
        f.svc.add_product(&f.ctx, pvz, ProductType::Shoes).await.unwrap();
        f.svc.close_reception(&f.ctx, pvz).await.unwrap();

        let err = f.svc.delete_last_product(&f.ctx, pvz).await.unwrap_err();
        assert!(matches!(err, DomainError::NoOpenReception { .. }));

        let second = f.svc.open_reception(&f.ctx, pvz).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn closing_an_empty_reception_is_allowed() {
        let f = Fixture::new();
        let pvz = f.pvz().await;
        f.svc.open_reception(&f.ctx, pvz).await.unwrap();
        assert!(f.svc.close_reception(&f.ctx, pvz).await.is_ok());
    }

    #[tokio::test]
    async fn search_filters_by_pvz_registration_date() {
        let f = Fixture::new();
        let day = |d| Utc.with_ymd_and_hms(2025, 3, d, 12, 0, 0).unwrap();
        let _early = f.pvz_registered_at(day(1)).await;
        let middle = f.pvz_registered_at(day(2)).await;
        let _late = f.pvz_registered_at(day(3)).await;

        let search = PvzSearch {
            window: DateWindow::new(Some(day(2) - Duration::hours(1)), Some(day(2) + Duration::hours(1))),
            page: Page::default(),
        };
        let found = f.svc.search_receptions(&f.ctx, &search).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pvz.id, middle);
        assert!(found[0].receptions.is_empty());
    }

    // Receptions are filtered by the same window as pickup points, so a
    // reception opened today is not listed for a point registered in the past
    // when the window only covers the registration date.
    #[tokio::test]
    async fn search_applies_window_to_receptions_too() {
        let f = Fixture::new();
        let registered = Utc::now() - Duration::days(10);
        let pvz = f.pvz_registered_at(registered).await;
        f.svc.open_reception(&f.ctx, pvz).await.unwrap();

        let narrow = PvzSearch {
            window: DateWindow::new(Some(registered - Duration::hours(1)), Some(registered + Duration::hours(1))),
            page: Page::default(),
        };
        let found = f.svc.search_receptions(&f.ctx, &narrow).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].receptions.is_empty());

        let wide = PvzSearch {
            window: DateWindow::new(Some(registered - Duration::hours(1)), None),
            page: Page::default(),
        };
        let found = f.svc.search_receptions(&f.ctx, &wide).await.unwrap();
        assert_eq!(found[0].receptions.len(), 1);
    }

    #[tokio::test]
    async fn search_nests_products_and_keeps_point_order() {
        let f = Fixture::new();
        let base = Utc::now() - Duration::days(1);
        let a = f.pvz_registered_at(base).await;
        let b = f.pvz_registered_at(base + Duration::minutes(1)).await;

        f.svc.open_reception(&f.ctx, b).await.unwrap();
        f.svc.add_product(&f.ctx, b, ProductType::Electronics).await.unwrap();
        f.svc.add_product(&f.ctx, b, ProductType::Clothes).await.unwrap();

        let found = f
            .svc
            .search_receptions(&f.ctx, &PvzSearch::default())
            .await
            .unwrap();

        assert_eq!(found.iter().map(|p| p.pvz.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(found[0].receptions.is_empty());
        let products: Vec<ProductType> = found[1].receptions[0]
            .products
            .iter()
            .map(|p| p.product_type)
            .collect();
        assert_eq!(products, vec![ProductType::Electronics, ProductType::Clothes]);
    }

    #[tokio::test]
    async fn cancelled_context_leaves_no_reception_behind() {
        let f = Fixture::new();
        let pvz = f.pvz().await;
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let ctx = OpContext::new("cancelled").with_cancel(token);

        let err = f.svc.open_reception(&ctx, pvz).await.unwrap_err();
        assert!(matches!(err, DomainError::Cancelled));
        assert!(f.svc.close_reception(&f.ctx, pvz).await.is_err());
    }

    /// Unit of work that behaves as if a concurrent request had won every
    /// race against it.
    struct LosingRaces;

    struct LosingTx;

    #[async_trait]
    impl ReceptionRepo for LosingRaces {
        async fn begin(&self) -> Result<Box<dyn ReceptionTx>, StorageError> {
            Ok(Box::new(LosingTx))
        }

        async fn list_receptions(
            &self,
            _pvz_ids: &[Uuid],
            _window: &DateWindow,
        ) -> Result<Vec<Reception>, StorageError> {
            Ok(Vec::new())
        }

        async fn list_products(&self, _ids: &[Uuid]) -> Result<Vec<Product>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn open(pvz_id: Uuid) -> Reception {
        Reception {
            id: Uuid::nil(),
            date_time: Utc::now(),
            pvz_id,
            status: ReceptionStatus::InProgress,
        }
    }

    #[async_trait]
    impl ReceptionTx for LosingTx {
        async fn get_open_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError> {
            // Pre-check passes for opens (pvz nil), finds an open reception otherwise.
            if pvz_id.is_nil() {
                Err(StorageError::NoOpenReception)
            } else {
                Ok(open(pvz_id))
            }
        }

        async fn create_reception(&mut self, _pvz_id: Uuid) -> Result<Reception, StorageError> {
            Err(StorageError::ReceptionAlreadyOpen)
        }

        async fn finish_reception(&mut self, _pvz_id: Uuid) -> Result<Reception, StorageError> {
            Err(StorageError::NoOpenReception)
        }

        async fn add_product(
            &mut self,
            _reception_id: Uuid,
            _product_type: ProductType,
        ) -> Result<Product, StorageError> {
            Err(StorageError::ReceptionNotInProgress)
        }

        async fn get_last_product(&mut self, reception_id: Uuid) -> Result<Product, StorageError> {
            Ok(Product {
                id: Uuid::new_v4(),
                date_time: Utc::now(),
                product_type: ProductType::Shoes,
                reception_id,
            })
        }

        async fn delete_product(&mut self, _product_id: Uuid) -> Result<(), StorageError> {
            Err(StorageError::NoProduct)
        }

        async fn commit(self: Box<Self>) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn losing_service() -> ReceptionService {
        let pvz = Arc::new(PvzService::new(Arc::new(MemoryStorage::new())));
        ReceptionService::new(Arc::new(LosingRaces), pvz)
    }

    #[tokio::test]
    async fn lost_open_race_maps_to_in_progress() {
        let svc = losing_service();
        let err = svc
            .open_reception(&OpContext::new("race"), Uuid::nil())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::ReceptionInProgress { reception_id: None }
        ));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn reception_closed_during_add_is_internal() {
        let svc = losing_service();
        let err = svc
            .add_product(&OpContext::new("race"), Uuid::new_v4(), ProductType::Clothes)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Internal { .. }));
    }

    #[tokio::test]
    async fn product_vanishing_before_delete_is_internal() {
        let svc = losing_service();
        let err = svc
            .delete_last_product(&OpContext::new("race"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Internal { .. }));
    }

    struct BrokenPvzRepo;

    #[async_trait]
    impl PvzRepo for BrokenPvzRepo {
        async fn create_pvz(&self, _new: NewPvz) -> Result<crate::domain::model::Pvz, StorageError> {
            Err(StorageError::backend("connection reset"))
        }

        async fn list_pvz(
            &self,
            _search: &PvzSearch,
        ) -> Result<Vec<crate::domain::model::Pvz>, StorageError> {
            Err(StorageError::backend("connection reset"))
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn finder_failure_is_logged_once() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let pvz = Arc::new(PvzService::new(Arc::new(BrokenPvzRepo)));
        let svc = ReceptionService::new(Arc::new(MemoryStorage::new()), pvz);
        let err = svc
            .search_receptions(&OpContext::new("search"), &PvzSearch::all())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Internal { .. }));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("operation failed").count(), 1, "{output}");
    }
}
