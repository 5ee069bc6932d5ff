//! HTTP server for the blob store.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::StorageResult;
use crate::router::{create_router, AppState};
use crate::service::BlobService;
use crate::trigger::{BlobTriggerHandler, TriggerDispatcher};

/// Blob storage server.
pub struct BlobServer {
    service: BlobService,
    triggers: Option<TriggerDispatcher>,
}

impl BlobServer {
    /// Creates a server over an existing service, without triggers.
    pub fn new(service: BlobService) -> Self {
        Self {
            service,
            triggers: None,
        }
    }

    /// Returns the served blob service.
    pub fn service(&self) -> &BlobService {
        &self.service
    }

    /// Creates the router with middleware.
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            service: self.service.clone(),
        };

        create_router(state).layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .expose_headers(Any),
            ),
        )
    }

    /// Runs the server.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.bind_address().parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Runs the server on an already bound listener, along with the garbage
    /// collector and any blob triggers.
    pub async fn serve(
        self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.router();

        let gc = self.service.garbage_collector();
        let gc_task = tokio::spawn(async move { gc.run().await });
        let trigger_task = self.triggers.map(|dispatcher| tokio::spawn(dispatcher.run()));

        info!("Blob service is listening at http://{}", listener.local_addr()?);
        match self.service.config().storage_root.as_ref() {
            Some(root) => info!("Persisting to {}", root.display()),
            None => info!("Keeping all data in memory"),
        }

        let result = axum::serve(listener, app).await;

        gc_task.abort();
        if let Some(task) = trigger_task {
            task.abort();
        }
        result?;
        Ok(())
    }

    /// Returns the bind address.
    pub fn bind_address(&self) -> String {
        self.service.config().bind_address()
    }

    /// Returns the base URL for the blob service.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.bind_address())
    }
}

/// Builder for creating a blob server.
pub struct BlobServerBuilder {
    config: Config,
    service: Option<BlobService>,
    triggers: Vec<(String, Arc<dyn BlobTriggerHandler>)>,
}

impl BlobServerBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            service: None,
            triggers: Vec::new(),
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Serves an existing service; its configuration replaces the builder's.
    pub fn service(mut self, service: BlobService) -> Self {
        self.service = Some(service);
        self
    }

    /// Binds a blob trigger.
    pub fn trigger(mut self, pattern: impl Into<String>, handler: Arc<dyn BlobTriggerHandler>) -> Self {
        self.triggers.push((pattern.into(), handler));
        self
    }

    /// Opens the storage and builds the server.
    pub async fn build(self) -> StorageResult<BlobServer> {
        let service = match self.service {
            Some(service) => service,
            None => BlobService::open(self.config).await?,
        };

        let mut dispatcher = TriggerDispatcher::new(service.clone());
        for (pattern, handler) in self.triggers {
            dispatcher = dispatcher.bind(&pattern, handler)?;
        }

        Ok(BlobServer {
            triggers: (!dispatcher.is_empty()).then_some(dispatcher),
            service,
        })
    }
}

impl Default for BlobServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
