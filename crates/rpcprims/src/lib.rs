//! Minimal RPC runtime over TCP.
//!
//! A caller invokes a method on an interface as if it were local while the
//! implementation runs in another process. Interfaces are declared once with
//! [`service!`]; providers serve and publish them, consumers discover them
//! through the registry and call them through generated stubs.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP bind and connect with bounded retries
//! - [`frame`]: length-prefixed framing (`u32` big-endian length + payload)
//! - [`codec`]: pluggable serialization (JSON, bincode)
//! - [`registry`]: endpoint discovery and the set-store daemon (`rpc` feature)
//! - [`rpc`]: correlation, server and client transports, stubs (`rpc` feature)
//! - [`demo`]: the Hello service used by the CLI and examples (`rpc` feature)

/// Re-export transport types.
pub mod transport {
    pub use rpcprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rpcprims_frame::*;
}

/// Re-export codec types.
pub mod codec {
    pub use rpcprims_codec::*;
}

/// Re-export registry types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod registry {
    pub use rpcprims_registry::*;
}

/// Re-export RPC types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod rpc {
    pub use rpcprims_rpc::*;
}

#[cfg(feature = "rpc")]
pub mod demo;

#[cfg(feature = "rpc")]
pub use rpcprims_rpc::service;
