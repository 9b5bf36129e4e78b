//! Server-side dispatch tables.
//!
//! A [`ServiceExport`] maps `method name + parameter signature` to a typed
//! handler. It is built once, when the implementation is exported (normally
//! by the `export` function that [`service!`](crate::service) generates), and
//! looked up per request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use rpcprims_codec::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::{Request, RpcFault};

/// Future returned by a [`MethodHandler`].
pub type HandlerFuture = BoxFuture<'static, Result<Vec<u8>, RpcFault>>;

/// Decodes arguments with the given codec, runs the method and encodes its
/// return value.
pub type MethodHandler = Arc<dyn Fn(Codec, Vec<Vec<u8>>) -> HandlerFuture + Send + Sync>;

type MethodKey = (String, Vec<String>);

/// Wrap a closure as a [`MethodHandler`].
pub fn handler<F>(f: F) -> MethodHandler
where
    F: Fn(Codec, Vec<Vec<u8>>) -> HandlerFuture + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Dispatch table of one exported implementation.
pub struct ServiceExport {
    interface_name: String,
    methods: HashMap<MethodKey, MethodHandler>,
}

impl ServiceExport {
    pub fn new(interface_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            methods: HashMap::new(),
        }
    }

    /// Add a method. A later registration with the same signature replaces
    /// the earlier one.
    pub fn method(
        mut self,
        name: impl Into<String>,
        parameter_types: &[&str],
        handler: MethodHandler,
    ) -> Self {
        let key = (
            name.into(),
            parameter_types.iter().map(|ty| ty.to_string()).collect(),
        );
        self.methods.insert(key, handler);
        self
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    /// Exported signatures, sorted.
    pub fn signatures(&self) -> Vec<(String, Vec<String>)> {
        let mut signatures: Vec<_> = self.methods.keys().cloned().collect();
        signatures.sort();
        signatures
    }

    /// Resolve and invoke the handler for `request`.
    pub async fn dispatch(&self, codec: Codec, request: Request) -> Result<Vec<u8>, RpcFault> {
        if request.target_interface != self.interface_name {
            return Err(RpcFault::dispatch(format!(
                "implementation serves {}, not {}",
                self.interface_name, request.target_interface
            )));
        }

        let key = (request.method_name, request.parameter_types);
        let Some(handler) = self.methods.get(&key) else {
            let (method, parameter_types) = key;
            let known_name = self.methods.keys().any(|(name, _)| *name == method);
            return Err(RpcFault::dispatch(if known_name {
                format!(
                    "{}.{method} has no overload taking ({})",
                    self.interface_name,
                    parameter_types.join(", ")
                )
            } else {
                format!("{} has no method {method}", self.interface_name)
            }));
        };

        handler(codec, request.arguments).await
    }
}

impl fmt::Debug for ServiceExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceExport")
            .field("interface_name", &self.interface_name)
            .field("methods", &self.signatures())
            .finish()
    }
}

/// Host interface the server uses to find the implementation a request names.
pub trait ImplementationLookup: Send + Sync + 'static {
    fn get_implementation(&self, implementation_ref: &str) -> Option<Arc<ServiceExport>>;
}

/// Implementations keyed by reference.
#[derive(Debug, Default)]
pub struct ServiceTable {
    exports: RwLock<HashMap<String, Arc<ServiceExport>>>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `export` under `implementation_ref`, returning any export it
    /// replaced.
    pub fn insert(
        &self,
        implementation_ref: impl Into<String>,
        export: ServiceExport,
    ) -> Option<Arc<ServiceExport>> {
        self.exports
            .write()
            .insert(implementation_ref.into(), Arc::new(export))
    }

    pub fn remove(&self, implementation_ref: &str) -> Option<Arc<ServiceExport>> {
        self.exports.write().remove(implementation_ref)
    }

    pub fn len(&self) -> usize {
        self.exports.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.read().is_empty()
    }
}

impl ImplementationLookup for ServiceTable {
    fn get_implementation(&self, implementation_ref: &str) -> Option<Arc<ServiceExport>> {
        self.exports.read().get(implementation_ref).cloned()
    }
}

/// Decode the next argument for parameter `name`.
pub fn next_argument<T: DeserializeOwned>(
    codec: Codec,
    arguments: &mut impl Iterator<Item = Vec<u8>>,
    name: &str,
) -> Result<T, RpcFault> {
    let bytes = arguments
        .next()
        .ok_or_else(|| RpcFault::bad_request(format!("missing argument {name}")))?;
    codec
        .deserialize(&bytes)
        .map_err(|err| RpcFault::bad_request(format!("argument {name}: {err}")))
}

/// Encode a handler's return value.
pub fn encode_return<T: Serialize>(codec: Codec, value: &T) -> Result<Vec<u8>, RpcFault> {
    codec
        .serialize(value)
        .map_err(|err| RpcFault::new(crate::protocol::FaultKind::Application, err.to_string()))
}
