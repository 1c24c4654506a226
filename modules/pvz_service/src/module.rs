use std::sync::Arc;

use anyhow::ensure;
use axum::Router;
use tracing::info;

use crate::api::grpc::{make_pvz_grpc_service, PvzGrpcService, SERVICE_NAME};
use crate::api::rest::{register_routes, ApiState};
use crate::config::{AuthSettings, PvzServiceConfig};
use crate::domain::ports::{PasswordHasher, PvzFinder, TokenService};
use crate::domain::service::{PvzService, ReceptionService, UserService};
use crate::infra::auth::{JwtTokenService, Sha256PasswordHasher};
use crate::infra::storage::Storage;

/// Wires storage, the engine and the identity services, and exposes them
/// to the HTTP and gRPC hosts.
#[derive(Clone)]
pub struct PvzModule {
    state: Arc<ApiState>,
    finder: Arc<dyn PvzFinder>,
}

impl PvzModule {
    pub fn new(
        storage: Storage,
        auth: &AuthSettings,
        config: PvzServiceConfig,
    ) -> anyhow::Result<Self> {
        ensure!(!auth.jwt_secret.is_empty(), "jwt secret must not be empty");
        ensure!(
            config.default_page_limit >= 1 && config.default_page_limit <= config.max_page_limit,
            "default_page_limit must be within 1..={}",
            config.max_page_limit
        );

        let tokens: Arc<dyn TokenService> = Arc::new(JwtTokenService::new(
            auth.jwt_secret.as_bytes(),
            auth.token_ttl,
        ));
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Sha256PasswordHasher);

        let pvz = PvzService::new(storage.pvz.clone());
        let finder: Arc<dyn PvzFinder> = Arc::new(pvz.clone());
        let receptions = ReceptionService::new(storage.receptions.clone(), finder.clone());
        let users = UserService::new(storage.users.clone(), tokens.clone(), hasher);

        info!(
            default_page_limit = config.default_page_limit,
            max_page_limit = config.max_page_limit,
            operation_timeout = ?config.operation_timeout,
            "pvz_service initialized"
        );

        Ok(Self {
            state: Arc::new(ApiState {
                pvz,
                receptions,
                users,
                tokens,
                config,
            }),
            finder,
        })
    }

    pub fn register_rest(&self, router: Router) -> Router {
        info!("registering pvz_service REST routes");
        register_routes(router, self.state.clone())
    }

    pub fn grpc_service_name(&self) -> &'static str {
        SERVICE_NAME
    }

    pub fn grpc_service(
        &self,
    ) -> pvz_grpc_stubs::PvzServiceServer<PvzGrpcService> {
        make_pvz_grpc_service(self.finder.clone())
    }
}
