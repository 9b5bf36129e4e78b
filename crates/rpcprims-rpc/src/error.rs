use std::time::Duration;

use crate::protocol::{FaultKind, RpcFault};

/// Errors that can occur in RPC operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error (bind, accept, socket options).
    #[error("transport error: {0}")]
    Transport(#[from] rpcprims_transport::TransportError),

    /// Frame-level error. Fatal for the connection it occurred on.
    #[error("frame error: {0}")]
    Frame(#[from] rpcprims_frame::FrameError),

    /// Serialization or deserialization failed.
    #[error("codec error: {0}")]
    Codec(#[from] rpcprims_codec::CodecError),

    /// The remote side answered the call with a fault.
    #[error("remote {kind} fault: {message}")]
    Remote { kind: FaultKind, message: String },

    /// No response arrived before the deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be opened or was lost while the call was
    /// pending.
    #[error("connection error: {0}")]
    Connection(String),

    /// Service discovery failed.
    #[error("registry error: {0}")]
    Registry(#[from] rpcprims_registry::RegistryError),

    /// A call with this correlation id is already pending.
    #[error("duplicate correlation id {0}")]
    DuplicateCorrelation(String),

    /// A request violated its own invariants before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Loading configuration failed.
    #[error("config error: {0}")]
    Config(String),
}

impl RpcError {
    /// An application-level failure raised by a service implementation.
    pub fn application(message: impl Into<String>) -> Self {
        RpcError::Remote {
            kind: FaultKind::Application,
            message: message.into(),
        }
    }

    /// True when the registry had no provider for the requested interface.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RpcError::Registry(rpcprims_registry::RegistryError::NotFound(_))
        )
    }
}

impl From<RpcFault> for RpcError {
    fn from(fault: RpcFault) -> Self {
        RpcError::Remote {
            kind: fault.kind,
            message: fault.message,
        }
    }
}

impl From<RpcError> for RpcFault {
    /// Errors returned by service implementations travel back as faults.
    /// Remote faults keep their kind; everything else is an application fault.
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote { kind, message } => RpcFault { kind, message },
            other => RpcFault::new(FaultKind::Application, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
