//! Integration points for the host application: a provider startup hook that
//! serves and publishes implementations, and a consumer-side stub factory.

use std::net::SocketAddr;
use std::sync::Arc;

use rpcprims_registry::{EndpointRecord, Registry};
use tracing::{info, warn};

use crate::config::{ClientConfig, ServerConfig};
use crate::error::Result;
use crate::server::{RpcServer, ServerHandle};
use crate::service::{ServiceExport, ServiceTable};
use crate::stub::{RemoteService, RemoteStub};

/// Collects implementations to serve, then starts the server and registers
/// one endpoint record per implementation.
pub struct Provider {
    registry: Registry,
    config: ServerConfig,
    exports: Vec<(String, ServiceExport)>,
}

impl Provider {
    pub fn new(registry: Registry, config: ServerConfig) -> Self {
        Self {
            registry,
            config,
            exports: Vec::new(),
        }
    }

    /// Serve `export` under `implementation_ref`.
    pub fn export(mut self, implementation_ref: impl Into<String>, export: ServiceExport) -> Self {
        self.exports.push((implementation_ref.into(), export));
        self
    }

    /// Bind the server, wait until it is ready, then register every export.
    ///
    /// If a registration fails, records registered so far are withdrawn and
    /// the server is stopped.
    pub async fn start(self) -> Result<ProviderHandle> {
        let Provider {
            registry,
            config,
            exports,
        } = self;

        let table = Arc::new(ServiceTable::new());
        let mut pending_records = Vec::with_capacity(exports.len());
        for (implementation_ref, export) in exports {
            pending_records.push((implementation_ref.clone(), export.interface_name().to_string()));
            table.insert(implementation_ref, export);
        }

        let advertise_host = config.advertise_host.clone();
        let server = RpcServer::start(config, table).await?;
        server.wait_ready().await?;
        let port = server.local_addr().port();

        let mut handle = ProviderHandle {
            server: Some(server),
            registry,
            records: Vec::with_capacity(pending_records.len()),
        };

        for (implementation_ref, interface_name) in pending_records {
            let record =
                EndpointRecord::new(interface_name, advertise_host.as_str(), port, implementation_ref);
            let registered = handle.registry.register(&record).await;
            if let Err(err) = registered {
                handle.shutdown().await;
                return Err(err.into());
            }
            handle.records.push(record);
        }

        info!(
            host = %advertise_host,
            port,
            services = handle.records.len(),
            "provider started"
        );
        Ok(handle)
    }
}

/// A running provider.
pub struct ProviderHandle {
    server: Option<ServerHandle>,
    registry: Registry,
    records: Vec<EndpointRecord>,
}

impl ProviderHandle {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }

    /// Records this provider published.
    pub fn records(&self) -> &[EndpointRecord] {
        &self.records
    }

    pub fn server(&self) -> Option<&ServerHandle> {
        self.server.as_ref()
    }

    /// Withdraw every record, then stop the server.
    ///
    /// Unregistration failures are logged; the server is stopped regardless.
    pub async fn shutdown(mut self) {
        for record in self.records.drain(..) {
            if let Err(err) = self.registry.unregister(&record).await {
                warn!(interface = %record.interface_name, error = %err, "failed to unregister endpoint");
            }
        }
        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }
        info!("provider stopped");
    }
}

/// Stub factory. Every stub resolves its interface once, at creation, and
/// owns its own connection.
#[derive(Debug, Clone)]
pub struct Consumer {
    registry: Registry,
    config: ClientConfig,
}

impl Consumer {
    pub fn new(registry: Registry, config: ClientConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Untyped stub for `interface_name`.
    pub async fn remote_stub(&self, interface_name: &str) -> Result<RemoteStub> {
        RemoteStub::resolve(&self.registry, interface_name, self.config.clone()).await
    }

    /// Typed client generated by [`service!`](crate::service).
    pub async fn stub<C: RemoteService>(&self) -> Result<C> {
        Ok(C::from_stub(self.remote_stub(C::INTERFACE).await?))
    }
}
