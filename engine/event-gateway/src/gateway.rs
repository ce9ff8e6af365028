//! HTTP server lifecycle

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::rest_api;
use event_pipeline::IngestHandle;
use std::future::Future;
use std::net::SocketAddr;
use tracing::info;

/// HTTP front door of the ingest service
pub struct EventGateway {
    config: GatewayConfig,
    ingest: IngestHandle,
}

impl EventGateway {
    pub fn new(config: GatewayConfig, ingest: IngestHandle) -> Self {
        Self { config, ingest }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Bind the listener and return the bound address with the server future.
    ///
    /// The server stops accepting connections once `shutdown` resolves and
    /// finishes when in-flight requests have completed.
    pub fn bind(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> GatewayResult<(SocketAddr, impl Future<Output = ()> + Send + 'static)> {
        self.config.validate().map_err(GatewayError::Config)?;
        let addr = self
            .config
            .server_addr()
            .map_err(|e| GatewayError::Config(format!("Invalid server address: {e}")))?;

        let routes = rest_api::create_routes(self.ingest, &self.config);
        let (bound, server) =
            warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown)?;

        info!("EventGateway listening on {}", bound);
        Ok((bound, server))
    }

    /// Serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> GatewayResult<()> {
        let (_, server) = self.bind(shutdown)?;
        server.await;

        info!("EventGateway stopped");
        Ok(())
    }
}
