use std::sync::Arc;
use std::time::Duration;

use rpcprims_codec::Codec;
use rpcprims_registry::{EndpointRecord, Registry};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::ClientTransport;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::Request;

/// Caller-side handle for one interface on one endpoint.
///
/// Clones share the same transport, and so the same connection.
#[derive(Debug, Clone)]
pub struct RemoteStub {
    interface_name: String,
    implementation_ref: String,
    call_timeout: Duration,
    transport: Arc<ClientTransport>,
}

impl RemoteStub {
    /// Stub bound to the endpoint described by `record`.
    pub fn new(record: &EndpointRecord, config: ClientConfig) -> Self {
        let call_timeout = config.call_timeout;
        Self {
            interface_name: record.interface_name.clone(),
            implementation_ref: record.implementation_ref.clone(),
            call_timeout,
            transport: Arc::new(ClientTransport::new(record.address(), config)),
        }
    }

    /// Resolve `interface_name` once and bind a stub to the chosen endpoint.
    pub async fn resolve(
        registry: &Registry,
        interface_name: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        let record = registry.resolve(interface_name).await?;
        debug!(interface = interface_name, addr = %record.address(), "binding stub");
        Ok(Self::new(&record, config))
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn implementation_ref(&self) -> &str {
        &self.implementation_ref
    }

    pub fn codec(&self) -> Codec {
        self.transport.codec()
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn transport(&self) -> &Arc<ClientTransport> {
        &self.transport
    }

    /// Same endpoint and connection, different deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Call `method` and decode its return value as `R`.
    pub async fn invoke<R: DeserializeOwned>(
        &self,
        method: &str,
        parameter_types: Vec<String>,
        arguments: Vec<Vec<u8>>,
    ) -> Result<R> {
        let request = Request::new(
            self.interface_name.as_str(),
            self.implementation_ref.as_str(),
            method,
            parameter_types,
            arguments,
        )?;
        let response = self.transport.send(request, self.call_timeout).await?;
        let value = response.into_value()?;
        Ok(self.codec().deserialize(&value)?)
    }
}

/// A typed client generated by [`service!`](crate::service).
pub trait RemoteService: Sized {
    /// Interface name the service is registered under.
    const INTERFACE: &'static str;

    fn from_stub(stub: RemoteStub) -> Self;
}
