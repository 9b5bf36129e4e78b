//! Service discovery for rpcprims.
//!
//! Providers publish an [`EndpointRecord`] under the interface they serve;
//! consumers resolve an interface name to one uniformly random record. Records
//! live in a keyed set store behind the [`RegistryStore`] trait: an in-process
//! [`MemoryStore`], or a [`RemoteStore`] talking to a [`StoreServer`] daemon
//! over the rpcprims frame protocol.

pub mod error;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod remote;
pub mod server;
pub mod store;

pub use error::{RegistryError, Result};
pub use protocol::{StoreCommand, StoreReply};
pub use record::EndpointRecord;
pub use registry::Registry;
pub use remote::RemoteStore;
pub use server::{StoreServer, StoreServerConfig, StoreServerHandle, DEFAULT_STORE_PORT};
pub use store::{MemoryStore, RegistryStore};
