//! Request/response RPC over framed TCP.
//!
//! A caller invokes a method on an interface as if it were local; the call
//! becomes a [`Request`] frame on a shared connection, the server dispatches
//! it to the exported implementation and the [`Response`] is matched back to
//! the waiting caller by correlation id.
//!
//! Interfaces are declared once with [`service!`], which generates the
//! service trait, a typed client and the server-side dispatch table.

pub mod client;
pub mod config;
pub mod correlation;
pub mod error;
pub mod host;
mod macros;
pub mod protocol;
pub mod server;
pub mod service;
pub mod stub;

pub use async_trait::async_trait;
pub use client::ClientTransport;
pub use config::{ClientConfig, ServerConfig, DEFAULT_CALL_TIMEOUT};
pub use correlation::{CorrelationSnapshot, CorrelationStats, CorrelationTable, PendingCall};
pub use error::{Result, RpcError};
pub use host::{Consumer, Provider, ProviderHandle};
pub use protocol::{new_correlation_id, FaultKind, Request, Response, RpcFault};
pub use rpcprims_codec::Codec;
pub use server::{RpcServer, ServerHandle, ServerState};
pub use service::{
    HandlerFuture, ImplementationLookup, MethodHandler, ServiceExport, ServiceTable,
};
pub use stub::{RemoteService, RemoteStub};

#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;

    pub use crate::service::{encode_return, handler, next_argument};
}
