use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Where a provider of an interface can be reached.
///
/// Stored JSON-encoded as a member of the set keyed by `interface_name`. The
/// encoding is deterministic (field order is declaration order), so the same
/// record always maps to the same set member and can be removed again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub interface_name: String,
    pub host: String,
    pub port: u16,
    /// Opaque key the provider's implementation lookup understands.
    pub implementation_ref: String,
}

impl EndpointRecord {
    pub fn new(
        interface_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        implementation_ref: impl Into<String>,
    ) -> Self {
        Self {
            interface_name: interface_name.into(),
            host: host.into(),
            port,
            implementation_ref: implementation_ref.into(),
        }
    }

    /// `host:port`, suitable for `rpcprims_transport::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Encode as a set member.
    pub fn to_member(&self) -> Result<String> {
        serde_json::to_string(self).map_err(RegistryError::InvalidRecord)
    }

    /// Decode a set member.
    pub fn from_member(member: &str) -> Result<Self> {
        serde_json::from_str(member).map_err(RegistryError::InvalidRecord)
    }
}

impl fmt::Display for EndpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}:{} ({})",
            self.interface_name, self.host, self.port, self.implementation_ref
        )
    }
}
