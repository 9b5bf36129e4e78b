use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use rpcprims_frame::{FrameCodec, FrameConfig, FrameError};
use rpcprims_transport::{connect_with_retry, configure_stream, RetryPolicy};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};
use crate::protocol::{StoreCommand, StoreReply};
use crate::store::RegistryStore;

type StoreConnection = Framed<TcpStream, FrameCodec>;

/// [`RegistryStore`] client for a [`StoreServer`](crate::StoreServer).
///
/// Holds one connection, opened on first use. Commands are serialized over
/// it. After any failure the connection is dropped and the next command opens
/// a fresh one; the failed command itself is not retried.
pub struct RemoteStore {
    addr: String,
    retry: RetryPolicy,
    request_timeout: Duration,
    frame_config: FrameConfig,
    conn: Mutex<Option<StoreConnection>>,
}

impl RemoteStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(5),
            frame_config: FrameConfig::default(),
            conn: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn open(&self) -> Result<StoreConnection> {
        let stream = connect_with_retry(&self.addr, &self.retry).await?;
        configure_stream(&stream)?;
        debug!(addr = %self.addr, "connected to store server");
        Ok(Framed::new(
            stream,
            FrameCodec::with_config(self.frame_config.clone()),
        ))
    }

    /// Send one command and wait for its reply.
    pub async fn execute(&self, command: StoreCommand) -> Result<StoreReply> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let conn = guard
            .as_mut()
            .ok_or_else(|| RegistryError::Protocol("store connection unavailable".to_string()))?;

        let result = roundtrip(conn, &command, self.request_timeout).await;
        if let Err(err) = &result {
            warn!(addr = %self.addr, op = command.name(), error = %err, "store command failed; dropping connection");
            *guard = None;
        }

        match result? {
            StoreReply::Error(message) => Err(RegistryError::Store(message)),
            reply => Ok(reply),
        }
    }
}

async fn roundtrip(
    conn: &mut StoreConnection,
    command: &StoreCommand,
    timeout: Duration,
) -> Result<StoreReply> {
    let payload = serde_json::to_vec(command)?;
    conn.send(Bytes::from(payload)).await?;

    let frame = match tokio::time::timeout(timeout, conn.next()).await {
        Err(_) => return Err(RegistryError::Timeout(timeout)),
        Ok(None) => return Err(FrameError::ConnectionClosed.into()),
        Ok(Some(frame)) => frame?,
    };
    Ok(serde_json::from_slice(&frame)?)
}

fn unexpected(command: &str, reply: StoreReply) -> RegistryError {
    RegistryError::Protocol(format!("unexpected reply to {command}: {reply:?}"))
}

#[async_trait]
impl RegistryStore for RemoteStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let command = StoreCommand::Add {
            key: key.to_string(),
            member: member.to_string(),
        };
        match self.execute(command).await? {
            StoreReply::Added(added) => Ok(added),
            other => Err(unexpected("add", other)),
        }
    }

    async fn set_random_member(&self, key: &str) -> Result<Option<String>> {
        let command = StoreCommand::RandomMember {
            key: key.to_string(),
        };
        match self.execute(command).await? {
            StoreReply::Member(member) => Ok(member),
            other => Err(unexpected("random_member", other)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let command = StoreCommand::Remove {
            key: key.to_string(),
            member: member.to_string(),
        };
        match self.execute(command).await? {
            StoreReply::Removed(removed) => Ok(removed),
            other => Err(unexpected("remove", other)),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let command = StoreCommand::Members {
            key: key.to_string(),
        };
        match self.execute(command).await? {
            StoreReply::Members(members) => Ok(members),
            other => Err(unexpected("members", other)),
        }
    }
}
