use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use uuid::Uuid;

use pvz_service::domain::context::OpContext;
use pvz_service::domain::error::DomainError;
use pvz_service::domain::model::{City, NewPvz, ProductType, PvzSearch};
use pvz_service::domain::service::{PvzService, ReceptionService};
use pvz_service::Storage;

fn services() -> (PvzService, ReceptionService) {
    let storage = Storage::in_memory();
    let pvz = PvzService::new(storage.pvz.clone());
    let receptions = ReceptionService::new(storage.receptions.clone(), Arc::new(pvz.clone()));
    (pvz, receptions)
}

async fn new_pvz(pvz: &PvzService) -> Uuid {
    pvz.create_pvz(
        &OpContext::new("seed"),
        NewPvz {
            id: Uuid::new_v4(),
            registration_date: Utc::now(),
            city: City::SaintPetersburg,
        },
    )
    .await
    .unwrap()
    .id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_opens_leave_one_reception_in_progress() {
    let (pvz, receptions) = services();
    let pvz_id = new_pvz(&pvz).await;

    let mut set = JoinSet::new();
    for i in 0..16 {
        let svc = receptions.clone();
        set.spawn(async move {
            svc.open_reception(&OpContext::new(format!("open-{i}")), pvz_id)
                .await
        });
    }

    let mut opened = Vec::new();
    let mut rejected = 0;
    while let Some(res) = set.join_next().await {
        match res.unwrap() {
            Ok(r) => opened.push(r),
            Err(DomainError::ReceptionInProgress { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(opened.len(), 1);
    assert_eq!(rejected, 15);

    let found = receptions
        .search_receptions(&OpContext::new("check"), &PvzSearch::all())
        .await
        .unwrap();
    let open: Vec<_> = found[0]
        .receptions
        .iter()
        .filter(|r| r.reception.is_open())
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].reception.id, opened[0].id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_all_land_in_the_open_reception() {
    let (pvz, receptions) = services();
    let pvz_id = new_pvz(&pvz).await;
    let reception = receptions
        .open_reception(&OpContext::new("open"), pvz_id)
        .await
        .unwrap();

    let mut set = JoinSet::new();
    for i in 0..20 {
        let svc = receptions.clone();
        set.spawn(async move {
            svc.add_product(&OpContext::new(format!("add-{i}")), pvz_id, ProductType::Clothes)
                .await
        });
    }
    while let Some(res) = set.join_next().await {
        assert_eq!(res.unwrap().unwrap().reception_id, reception.id);
    }

    for _ in 0..20 {
        receptions
            .delete_last_product(&OpContext::new("delete"), pvz_id)
            .await
            .unwrap();
    }
    let err = receptions
        .delete_last_product(&OpContext::new("delete"), pvz_id)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NoProduct { .. }));
}

#[tokio::test]
async fn expired_deadline_is_reported() {
    let (pvz, receptions) = services();
    let pvz_id = new_pvz(&pvz).await;

    let ctx = OpContext::new("late").with_timeout(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(5)).await;
    let err = receptions.open_reception(&ctx, pvz_id).await.unwrap_err();
    assert!(matches!(err, DomainError::DeadlineExceeded));

    // Nothing was left open by the aborted call.
    receptions
        .open_reception(&OpContext::new("retry"), pvz_id)
        .await
        .unwrap();
}
