pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

pub use error::ApiError;
pub use extract::{Authenticated, RequestId, REQUEST_ID_HEADER};
pub use routes::{register_routes, ApiDoc};

use crate::config::PvzServiceConfig;
use crate::domain::context::OpContext;
use crate::domain::ports::TokenService;
use crate::domain::service::{PvzService, ReceptionService, UserService};

/// Everything the handlers reach through `Extension<Arc<ApiState>>`.
#[derive(Clone)]
pub struct ApiState {
    pub pvz: PvzService,
    pub receptions: ReceptionService,
    pub users: UserService,
    pub tokens: Arc<dyn TokenService>,
    pub config: PvzServiceConfig,
}

impl ApiState {
    pub(crate) fn op_context(&self, request_id: &RequestId) -> OpContext {
        OpContext::new(request_id.as_str()).with_timeout(self.config.operation_timeout)
    }
}
