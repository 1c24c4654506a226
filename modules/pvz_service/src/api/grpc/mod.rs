mod server;

pub use server::{make_pvz_grpc_service, PvzGrpcService, SERVICE_NAME};
