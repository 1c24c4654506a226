//! In-process storage backend used by `--mock` runs and tests.
//!
//! A unit of work holds the state lock for its whole lifetime and edits the
//! state in place, recording an undo entry per change. Dropping it without
//! `commit` replays the entries backwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::model::{
    DateWindow, NewPvz, NewUser, Product, ProductType, Pvz, PvzSearch, Reception,
    ReceptionStatus, User,
};
use crate::domain::ports::{PvzRepo, ReceptionRepo, ReceptionTx, StorageError, UserRepo};

#[derive(Debug, Default)]
struct State {
    pvz: HashMap<Uuid, Pvz>,
    receptions: Vec<Reception>,
    products: Vec<StoredProduct>,
    users: HashMap<String, User>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct StoredProduct {
    seq: u64,
    product: Product,
}

impl State {
    fn open_reception(&self, pvz_id: Uuid) -> Option<&Reception> {
        self.receptions
            .iter()
            .find(|r| r.pvz_id == pvz_id && r.is_open())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PvzRepo for MemoryStorage {
    async fn create_pvz(&self, new: NewPvz) -> Result<Pvz, StorageError> {
        let mut state = self.state.lock().await;
        if state.pvz.contains_key(&new.id) {
            return Err(StorageError::DuplicatePvzId);
        }
        let pvz = Pvz {
            id: new.id,
            registration_date: new.registration_date,
            city: new.city,
        };
        state.pvz.insert(pvz.id, pvz.clone());
        Ok(pvz)
    }

    async fn list_pvz(&self, search: &PvzSearch) -> Result<Vec<Pvz>, StorageError> {
        let state = self.state.lock().await;
        let mut matching: Vec<Pvz> = state
            .pvz
            .values()
            .filter(|p| search.window.contains(p.registration_date))
            .cloned()
            .collect();
        matching.sort_by_key(|p| (p.registration_date, p.id));

        let offset = usize::try_from(search.page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(search.page.limit()).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl ReceptionRepo for MemoryStorage {
    async fn begin(&self) -> Result<Box<dyn ReceptionTx>, StorageError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTx::new(guard)))
    }

    async fn list_receptions(
        &self,
        pvz_ids: &[Uuid],
        window: &DateWindow,
    ) -> Result<Vec<Reception>, StorageError> {
        let state = self.state.lock().await;
        let mut out: Vec<Reception> = state
            .receptions
            .iter()
            .filter(|r| pvz_ids.contains(&r.pvz_id) && window.contains(r.date_time))
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.date_time, r.id));
        Ok(out)
    }

    async fn list_products(&self, reception_ids: &[Uuid]) -> Result<Vec<Product>, StorageError> {
        let state = self.state.lock().await;
        let mut stored: Vec<&StoredProduct> = state
            .products
            .iter()
            .filter(|p| reception_ids.contains(&p.product.reception_id))
            .collect();
        stored.sort_by_key(|p| p.seq);
        Ok(stored.into_iter().map(|p| p.product.clone()).collect())
    }
}

#[async_trait]
impl UserRepo for MemoryStorage {
    async fn create_user(&self, new: NewUser) -> Result<User, StorageError> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(&new.email) {
            return Err(StorageError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
        };
        state.users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        let state = self.state.lock().await;
        state
            .users
            .get(email)
            .cloned()
            .ok_or(StorageError::UserNotFound)
    }
}

enum Undo {
    ReceptionCreated(Uuid),
    ReceptionFinished(Uuid),
    ProductAdded(Uuid),
    ProductDeleted(usize, StoredProduct),
}

struct MemoryTx {
    working: OwnedMutexGuard<State>,
    undo: Vec<Undo>,
}

impl MemoryTx {
    fn new(working: OwnedMutexGuard<State>) -> Self {
        Self {
            working,
            undo: Vec::new(),
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        let state = &mut *self.working;
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::ReceptionCreated(id) => state.receptions.retain(|r| r.id != id),
                Undo::ReceptionFinished(id) => {
                    if let Some(r) = state.receptions.iter_mut().find(|r| r.id == id) {
                        r.status = ReceptionStatus::InProgress;
                    }
                }
                Undo::ProductAdded(id) => state.products.retain(|p| p.product.id != id),
                Undo::ProductDeleted(index, stored) => {
                    let index = index.min(state.products.len());
                    state.products.insert(index, stored);
                }
            }
        }
    }
}

#[async_trait]
impl ReceptionTx for MemoryTx {
    async fn get_open_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError> {
        self.working
            .open_reception(pvz_id)
            .cloned()
            .ok_or(StorageError::NoOpenReception)
    }

    async fn create_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError> {
        if !self.working.pvz.contains_key(&pvz_id) {
            return Err(StorageError::PvzNotFound);
        }
        if self.working.open_reception(pvz_id).is_some() {
            return Err(StorageError::ReceptionAlreadyOpen);
        }
        let reception = Reception {
            id: Uuid::new_v4(),
            date_time: Utc::now(),
            pvz_id,
            status: ReceptionStatus::InProgress,
        };
        self.working.receptions.push(reception.clone());
        self.undo.push(Undo::ReceptionCreated(reception.id));
        Ok(reception)
    }

    async fn finish_reception(&mut self, pvz_id: Uuid) -> Result<Reception, StorageError> {
        let reception = self
            .working
            .receptions
            .iter_mut()
            .find(|r| r.pvz_id == pvz_id && r.is_open())
            .ok_or(StorageError::NoOpenReception)?;
        reception.status = ReceptionStatus::Finished;
        let finished = reception.clone();
        self.undo.push(Undo::ReceptionFinished(finished.id));
        Ok(finished)
    }

    async fn add_product(
        &mut self,
        reception_id: Uuid,
        product_type: ProductType,
    ) -> Result<Product, StorageError> {
        let open = self
            .working
            .receptions
            .iter()
            .any(|r| r.id == reception_id && r.is_open());
        if !open {
            return Err(StorageError::ReceptionNotInProgress);
        }

        self.working.next_seq += 1;
        let seq = self.working.next_seq;
        let product = Product {
            id: Uuid::new_v4(),
            date_time: Utc::now(),
            product_type,
            reception_id,
        };
        self.working.products.push(StoredProduct {
            seq,
            product: product.clone(),
        });
        self.undo.push(Undo::ProductAdded(product.id));
        Ok(product)
    }

    async fn get_last_product(&mut self, reception_id: Uuid) -> Result<Product, StorageError> {
        self.working
            .products
            .iter()
            .filter(|p| p.product.reception_id == reception_id)
            .max_by_key(|p| (p.product.date_time, p.seq))
            .map(|p| p.product.clone())
            .ok_or(StorageError::NoProduct)
    }

    async fn delete_product(&mut self, product_id: Uuid) -> Result<(), StorageError> {
        let index = self
            .working
            .products
            .iter()
            .position(|p| p.product.id == product_id)
            .ok_or(StorageError::NoProduct)?;
        let stored = self.working.products.remove(index);
        self.undo.push(Undo::ProductDeleted(index, stored));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.undo.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::City;

    async fn storage_with_pvz() -> (MemoryStorage, Uuid) {
        let storage = MemoryStorage::new();
        let pvz = storage
            .create_pvz(NewPvz {
                id: Uuid::new_v4(),
                registration_date: Utc::now(),
                city: City::Moscow,
            })
            .await
            .unwrap();
        (storage, pvz.id)
    }

    #[tokio::test]
    async fn duplicate_pvz_is_rejected() {
        let (storage, id) = storage_with_pvz().await;
        let err = storage
            .create_pvz(NewPvz {
                id,
                registration_date: Utc::now(),
                city: City::Kazan,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicatePvzId));
    }

    #[tokio::test]
    async fn uncommitted_work_is_discarded() {
        let (storage, pvz_id) = storage_with_pvz().await;
        {
            let mut tx = storage.begin().await.unwrap();
            tx.create_reception(pvz_id).await.unwrap();
        }
        let mut tx = storage.begin().await.unwrap();
        assert!(matches!(
            tx.get_open_reception(pvz_id).await,
            Err(StorageError::NoOpenReception)
        ));
    }

    #[tokio::test]
    async fn rollback_restores_finished_reception_and_deleted_products() {
        let (storage, pvz_id) = storage_with_pvz().await;
        let mut tx = storage.begin().await.unwrap();
        let reception = tx.create_reception(pvz_id).await.unwrap();
        let first = tx
            .add_product(reception.id, ProductType::Electronics)
            .await
            .unwrap();
        let second = tx
            .add_product(reception.id, ProductType::Clothes)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        {
            let mut tx = storage.begin().await.unwrap();
            tx.delete_product(first.id).await.unwrap();
            tx.add_product(reception.id, ProductType::Shoes).await.unwrap();
            tx.finish_reception(pvz_id).await.unwrap();
        }

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(tx.get_open_reception(pvz_id).await.unwrap().id, reception.id);
        drop(tx);
        let products = storage.list_products(&[reception.id]).await.unwrap();
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn second_open_reception_violates_constraint() {
        let (storage, pvz_id) = storage_with_pvz().await;
        let mut tx = storage.begin().await.unwrap();
        tx.create_reception(pvz_id).await.unwrap();
        assert!(matches!(
            tx.create_reception(pvz_id).await,
            Err(StorageError::ReceptionAlreadyOpen)
        ));
    }

    #[tokio::test]
    async fn reception_requires_known_pvz() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        assert!(matches!(
            tx.create_reception(Uuid::new_v4()).await,
            Err(StorageError::PvzNotFound)
        ));
    }

    #[tokio::test]
    async fn product_insert_into_finished_reception_fails() {
        let (storage, pvz_id) = storage_with_pvz().await;
        let mut tx = storage.begin().await.unwrap();
        let reception = tx.create_reception(pvz_id).await.unwrap();
        tx.finish_reception(pvz_id).await.unwrap();
        assert!(matches!(
            tx.add_product(reception.id, ProductType::Shoes).await,
            Err(StorageError::ReceptionNotInProgress)
        ));
    }

    #[tokio::test]
    async fn last_product_uses_insertion_order_on_equal_timestamps() {
        let (storage, pvz_id) = storage_with_pvz().await;
        let mut tx = MemoryTx::new(storage.state.clone().lock_owned().await);

        let reception = tx.create_reception(pvz_id).await.unwrap();
        let first = tx
            .add_product(reception.id, ProductType::Clothes)
            .await
            .unwrap();
        let second = tx
            .add_product(reception.id, ProductType::Shoes)
            .await
            .unwrap();

        for stored in &mut tx.working.products {
            stored.product.date_time = first.date_time;
        }

        let last = tx.get_last_product(reception.id).await.unwrap();
        assert_eq!(last.id, second.id);

        tx.delete_product(second.id).await.unwrap();
        assert!(matches!(
            tx.delete_product(second.id).await,
            Err(StorageError::NoProduct)
        ));
        assert_eq!(tx.get_last_product(reception.id).await.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn pvz_listing_is_paged_in_registration_order() {
        let storage = MemoryStorage::new();
        let base = Utc::now();
        for days in [2, 0, 1] {
            storage
                .create_pvz(NewPvz {
                    id: Uuid::new_v4(),
                    registration_date: base + chrono::Duration::days(days),
                    city: City::SaintPetersburg,
                })
                .await
                .unwrap();
        }

        let page = |n, l| PvzSearch {
            window: DateWindow::default(),
            page: crate::domain::model::Page::new(n, l).unwrap(),
        };
        let first = storage.list_pvz(&page(1, 2)).await.unwrap();
        let second = storage.list_pvz(&page(2, 2)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(first[0].registration_date < first[1].registration_date);
        assert!(first[1].registration_date < second[0].registration_date);
    }
}
