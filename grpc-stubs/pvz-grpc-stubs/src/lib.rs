//! Generated gRPC stubs for the pickup point read service (`pvz.v1.PVZService`).
//!
//! Only protobuf types and tonic client/server stubs live here.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod pb {
    tonic::include_proto!("pvz.v1");
}

pub use pb::pvz_service_client::PvzServiceClient;
pub use pb::pvz_service_server::{PvzService, PvzServiceServer};
pub use pb::{GetPvzListRequest, GetPvzListResponse, Pvz};
