use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use rpcprims_frame::{FrameCodec, FrameConfig, DEFAULT_MAX_PAYLOAD};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, Result};
use crate::protocol::{StoreCommand, StoreReply};
use crate::store::MemoryStore;

/// Default TCP port of the store daemon.
pub const DEFAULT_STORE_PORT: u16 = 7379;

/// Configuration for [`StoreServer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreServerConfig {
    pub bind_host: String,
    /// `0` picks an ephemeral port.
    pub port: u16,
    pub max_connections: usize,
    pub max_payload_size: usize,
}

impl Default for StoreServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: DEFAULT_STORE_PORT,
            max_connections: 256,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl StoreServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| RegistryError::Config(format!("{}: {err}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|err| RegistryError::Config(format!("{}: {err}", path.display())))
    }
}

/// Handle to a running store daemon. Dropping stops it.
pub struct StoreServerHandle {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<JoinHandle<()>>,
}

impl StoreServerHandle {
    /// Address the daemon is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The set store served by this daemon.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Stop accepting, close open connections and wait for the accept loop.
    pub async fn shutdown(mut self) {
        self.signal_shutdown();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
        info!(addr = %self.addr, "store server stopped");
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for StoreServerHandle {
    fn drop(&mut self) {
        self.signal_shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// TCP daemon serving a [`MemoryStore`] with the JSON command set from
/// [`crate::protocol`].
pub struct StoreServer;

impl StoreServer {
    /// Start a daemon with an empty store.
    pub async fn start(config: StoreServerConfig) -> Result<StoreServerHandle> {
        Self::start_with_store(config, Arc::new(MemoryStore::new())).await
    }

    /// Start a daemon serving an existing store.
    pub async fn start_with_store(
        config: StoreServerConfig,
        store: Arc<MemoryStore>,
    ) -> Result<StoreServerHandle> {
        let listener = rpcprims_transport::bind(&config.bind_addr()).await?;
        let addr = listener.local_addr().map_err(rpcprims_transport::TransportError::Io)?;
        info!(%addr, "store server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            Arc::clone(&store),
            config,
            shutdown_rx,
            conn_shutdown_rx,
        ));

        Ok(StoreServerHandle {
            addr,
            store,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        store: Arc<MemoryStore>,
        config: StoreServerConfig,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
    ) {
        let active_connections = Arc::new(AtomicUsize::new(0));
        let frame_config = FrameConfig {
            max_payload_size: config.max_payload_size,
        };

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("store server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            error!(error = %err, "store accept error");
                            continue;
                        }
                    };

                    if active_connections.load(Ordering::Relaxed) >= config.max_connections {
                        warn!(%peer, max = config.max_connections, "rejecting store connection: at capacity");
                        continue;
                    }

                    active_connections.fetch_add(1, Ordering::Relaxed);
                    let conns = Arc::clone(&active_connections);
                    let store = Arc::clone(&store);
                    let frame_config = frame_config.clone();
                    let mut conn_shutdown = conn_shutdown_rx.clone();

                    tokio::spawn(async move {
                        debug!(%peer, "store connection accepted");
                        if let Err(err) =
                            Self::handle_connection(stream, &store, frame_config, &mut conn_shutdown).await
                        {
                            debug!(%peer, error = %err, "store connection ended with error");
                        }
                        conns.fetch_sub(1, Ordering::Relaxed);
                    });
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        store: &MemoryStore,
        frame_config: FrameConfig,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        rpcprims_transport::configure_stream(&stream)?;
        let mut framed = Framed::new(stream, FrameCodec::with_config(frame_config));

        loop {
            let frame = tokio::select! {
                next = framed.next() => match next {
                    Some(frame) => frame?,
                    None => return Ok(()),
                },
                _ = shutdown_rx.changed() => return Ok(()),
            };

            let reply = match serde_json::from_slice::<StoreCommand>(&frame) {
                Ok(command) => {
                    debug!(op = command.name(), key = command.key(), "store command");
                    apply(store, command)
                }
                Err(err) => StoreReply::Error(format!("invalid command: {err}")),
            };

            let payload = serde_json::to_vec(&reply)?;
            framed.send(Bytes::from(payload)).await?;
        }
    }
}

/// Execute one command against `store`.
pub fn apply(store: &MemoryStore, command: StoreCommand) -> StoreReply {
    match command {
        StoreCommand::Add { key, member } => StoreReply::Added(store.add(&key, &member)),
        StoreCommand::RandomMember { key } => StoreReply::Member(store.random_member(&key)),
        StoreCommand::Remove { key, member } => StoreReply::Removed(store.remove(&key, &member)),
        StoreCommand::Members { key } => StoreReply::Members(store.members(&key)),
    }
}
