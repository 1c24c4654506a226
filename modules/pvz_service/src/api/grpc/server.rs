//! gRPC read endpoint over the pickup point listing.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::instrument;

use pvz_grpc_stubs::{GetPvzListRequest, GetPvzListResponse, PvzServiceServer};

use crate::domain::context::OpContext;
use crate::domain::error::DomainError;
use crate::domain::model::{Pvz, PvzSearch};
use crate::domain::ports::PvzFinder;

pub const SERVICE_NAME: &str = pvz_grpc_stubs::pb::pvz_service_server::SERVICE_NAME;

#[derive(Clone)]
pub struct PvzGrpcService {
    finder: Arc<dyn PvzFinder>,
}

impl PvzGrpcService {
    pub fn new(finder: Arc<dyn PvzFinder>) -> Self {
        Self { finder }
    }
}

fn to_proto(pvz: Pvz) -> pvz_grpc_stubs::Pvz {
    pvz_grpc_stubs::Pvz {
        id: pvz.id.to_string(),
        registration_date: Some(prost_types::Timestamp {
            seconds: pvz.registration_date.timestamp(),
            nanos: pvz.registration_date.timestamp_subsec_nanos() as i32,
        }),
        city: pvz.city.as_str().to_string(),
    }
}

fn to_status(e: DomainError) -> Status {
    match e {
        DomainError::Cancelled => Status::cancelled(e.to_string()),
        DomainError::DeadlineExceeded => Status::deadline_exceeded(e.to_string()),
        e if e.is_client_error() => Status::invalid_argument(e.to_string()),
        _ => Status::internal("internal server error"),
    }
}

#[tonic::async_trait]
impl pvz_grpc_stubs::PvzService for PvzGrpcService {
    #[instrument(name = "pvz.grpc.get_pvz_list", skip_all, fields(request_id = tracing::field::Empty))]
    async fn get_pvz_list(
        &self,
        request: Request<GetPvzListRequest>,
    ) -> Result<Response<GetPvzListResponse>, Status> {
        let request_id = request
            .metadata()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        tracing::Span::current().record("request_id", request_id.as_str());

        let ctx = OpContext::new(request_id);
        let points = self
            .finder
            .find_pvz(&ctx, &PvzSearch::all())
            .await
            .map_err(to_status)?;

        Ok(Response::new(GetPvzListResponse {
            pvzs: points.into_iter().map(to_proto).collect(),
        }))
    }
}

/// Create the tonic service for `pvz.v1.PVZService`.
pub fn make_pvz_grpc_service(finder: Arc<dyn PvzFinder>) -> PvzServiceServer<PvzGrpcService> {
    PvzServiceServer::new(PvzGrpcService::new(finder))
}
