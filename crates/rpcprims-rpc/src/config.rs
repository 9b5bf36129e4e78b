use std::path::Path;
use std::time::Duration;

use rpcprims_codec::Codec;
use rpcprims_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use rpcprims_transport::tcp::millis;
use rpcprims_transport::RetryPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// Default deadline for one call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Server transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_host: String,
    /// `0` picks an ephemeral port.
    pub port: u16,
    /// Host published in endpoint records.
    pub advertise_host: String,
    pub max_connections: usize,
    /// Requests dispatched concurrently per connection. Further requests wait
    /// to be read until a slot frees up.
    pub max_in_flight_per_connection: usize,
    pub max_payload_size: usize,
    pub codec: Codec,
    /// How long a closing connection waits for in-flight responses before
    /// it is torn down.
    #[serde(with = "millis")]
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            advertise_host: "127.0.0.1".to_string(),
            max_connections: 1024,
            max_in_flight_per_connection: 64,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            codec: Codec::default(),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }
}

/// Client transport and stub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "millis")]
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub max_payload_size: usize,
    pub codec: Codec,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            retry: RetryPolicy::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            codec: Codec::default(),
        }
    }
}

impl ClientConfig {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }

    /// Timeout of a single connect attempt.
    pub fn connect_timeout(&self) -> Duration {
        self.retry.connect_timeout
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| RpcError::Config(format!("{}: {err}", path.display())))?;
    serde_json::from_str(&raw).map_err(|err| RpcError::Config(format!("{}: {err}", path.display())))
}
