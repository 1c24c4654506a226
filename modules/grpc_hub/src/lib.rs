//! gRPC Hub
//!
//! Builds and hosts the single tonic::Server instance for the process.

use std::collections::HashSet;
use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tonic::service::RoutesBuilder;
use tonic::transport::server::TcpIncoming;
use tonic::transport::{Identity, Server, ServerTlsConfig};

mod config;

pub use config::{GrpcHubConfig, TlsConfig};

/// Installs one tonic service into the shared router.
pub struct RegisterGrpcServiceFn {
    pub service_name: &'static str,
    pub register: Box<dyn Fn(&mut RoutesBuilder) + Send + Sync>,
}

/// Fired once the hub is accepting connections, with the bound address,
/// or with `None` when it idles because nothing was installed.
pub struct ReadySignal(oneshot::Sender<Option<SocketAddr>>);

impl ReadySignal {
    pub fn from_sender(tx: oneshot::Sender<Option<SocketAddr>>) -> Self {
        Self(tx)
    }

    pub fn notify(self, addr: Option<SocketAddr>) {
        let _ = self.0.send(addr);
    }
}

pub struct GrpcHub {
    config: GrpcHubConfig,
}

impl GrpcHub {
    pub fn new(config: GrpcHubConfig) -> Self {
        Self { config }
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        self.config
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen_addr '{}'", self.config.listen_addr))
    }

    async fn tls_config(&self) -> anyhow::Result<Option<ServerTlsConfig>> {
        let Some(tls) = &self.config.tls else {
            return Ok(None);
        };
        let cert = tokio::fs::read(&tls.cert_file)
            .await
            .with_context(|| format!("failed to read cert_file {}", tls.cert_file.display()))?;
        let key = tokio::fs::read(&tls.key_file)
            .await
            .with_context(|| format!("failed to read key_file {}", tls.key_file.display()))?;
        Ok(Some(
            ServerTlsConfig::new().identity(Identity::from_pem(cert, key)),
        ))
    }

    /// Run the tonic server with the provided installers until `cancel` fires.
    pub async fn run_with_installers(
        &self,
        installers: Vec<RegisterGrpcServiceFn>,
        cancel: CancellationToken,
        ready: ReadySignal,
    ) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for installer in &installers {
            if !seen.insert(installer.service_name) {
                anyhow::bail!(
                    "Duplicate gRPC service detected: {}",
                    installer.service_name
                );
            }
        }

        if installers.is_empty() {
            tracing::info!("no gRPC services installed; gRPC hub idle");
            ready.notify(None);
            cancel.cancelled().await;
            return Ok(());
        }

        let mut routes_builder = RoutesBuilder::default();
        for installer in installers {
            (installer.register)(&mut routes_builder);
            tracing::debug!(service = installer.service_name, "gRPC service installed");
        }
        let routes = routes_builder.routes();

        let mut builder = Server::builder()
            .http2_keepalive_interval(self.config.keepalive_interval)
            .http2_keepalive_timeout(Some(self.config.keepalive_timeout));
        if let Some(tls) = self.tls_config().await? {
            builder = builder
                .tls_config(tls)
                .context("invalid gRPC TLS configuration")?;
            tracing::info!("gRPC TLS enabled");
        }

        let addr = self.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind gRPC listener on {addr}"))?;
        let local = listener.local_addr()?;
        tracing::info!("gRPC server bound on {}", local);
        ready.notify(Some(local));

        builder
            .add_routes(routes)
            .serve_with_incoming_shutdown(TcpIncoming::from(listener), async move {
                cancel.cancelled().await;
                tracing::info!("gRPC server shutting down gracefully (cancellation)");
            })
            .await
            .context("gRPC server failed")?;

        Ok(())
    }
}
