use std::fmt;
use std::io;

use rpcprims::frame::FrameError;
use rpcprims::registry::RegistryError;
use rpcprims::rpc::{FaultKind, RpcError};
use rpcprims::transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
/// No provider is registered for the interface, or it lacks the method.
pub const UNAVAILABLE: i32 = 69;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn registry_error(context: &str, err: RegistryError) -> CliError {
    match err {
        RegistryError::Transport(err) => transport_error(context, err),
        RegistryError::Frame(err) => frame_error(context, err),
        RegistryError::NotFound(_) => CliError::new(UNAVAILABLE, format!("{context}: {err}")),
        RegistryError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        RegistryError::InvalidRecord(_)
        | RegistryError::Json(_)
        | RegistryError::Protocol(_)
        | RegistryError::Config(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RegistryError::Store(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match err {
        RpcError::Transport(err) => transport_error(context, err),
        RpcError::Frame(err) => frame_error(context, err),
        RpcError::Registry(err) => registry_error(context, err),
        RpcError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        RpcError::Connection(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        RpcError::Remote { kind, .. } => {
            let code = match kind {
                FaultKind::Dispatch => UNAVAILABLE,
                FaultKind::BadRequest => DATA_INVALID,
                FaultKind::Application => FAILURE,
            };
            CliError::new(code, format!("{context}: {err}"))
        }
        RpcError::Codec(_) | RpcError::Config(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RpcError::InvalidRequest(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
