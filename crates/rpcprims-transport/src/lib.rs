//! TCP transport primitives.
//!
//! This is the lowest layer of rpcprims: binding a listener for the server
//! side and establishing outbound connections (with bounded retries) for the
//! client side. Everything else builds on the [`TcpStream`] values returned
//! here.
//!
//! [`TcpStream`]: tokio::net::TcpStream

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{bind, connect, connect_with_retry, configure_stream, RetryPolicy};
