/// Errors that can occur in registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No provider is registered for the interface.
    #[error("no provider registered for interface '{0}'")]
    NotFound(String),

    /// A stored member is not a valid endpoint record.
    #[error("invalid endpoint record: {0}")]
    InvalidRecord(#[source] serde_json::Error),

    /// The store daemon answered with an error.
    #[error("store error: {0}")]
    Store(String),

    /// The store daemon sent something other than the expected reply.
    #[error("store protocol error: {0}")]
    Protocol(String),

    /// The store daemon did not answer in time.
    #[error("store request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] rpcprims_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] rpcprims_frame::FrameError),

    /// JSON encoding of a store command or reply failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Loading configuration failed.
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
